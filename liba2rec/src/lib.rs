//! # a2rec
//!
//! a2rec turns raw data-acquisition files of an A2-style tagged-photon
//! experiment into structured, calibrated physics events. It reads the
//! mark-delimited Acqu binary format (and the equivalent A2Geant
//! Monte-Carlo stream), unpacks per-channel hits, applies per-channel
//! calibration, groups hits into clusters and builds particle candidates,
//! emitting one immutable event record per trigger.
//!
//! ## Pipeline
//!
//! ```text
//! raw file -> RecordReader -> Unpacker -> RawEventBlock
//!          -> Reconstruct (calibrate -> cluster -> candidates -> finalize)
//!          -> EventData -> EventSink
//! ```
//!
//! The unpacker variant (Acqu or A2Geant) is chosen once at open time from
//! the file's header signature; both produce the same `RawEventBlock` shape,
//! so everything downstream is format-agnostic. Malformed blocks are skipped
//! with a diagnostic message and decoding resumes at the next event
//! boundary; only an unrecognized file format, a desynchronized record
//! stream or a missing calibration file abort a run.
//!
//! Each run is processed by a single-threaded pull pipeline. Parallelism
//! happens across runs: the worker threads share nothing but the read-only
//! calibration snapshots.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! raw_path: /data/raw
//! calibration_path: /data/calibration.yaml
//! channel_map_path: null
//! first_run_number: 0
//! last_run_number: 0
//! n_threads: 1
//! reconstruction:
//!   cluster_time_window: 15.0
//!   neighbour_radius: 7.0
//!   phi_epsilon: 0.25
//!   pedestal_warmup_events: 0
//! ```
//!
//! Note that if the `channel_map_path` field is set to `null`, the bundled
//! default map will be used.
//!
//! ## Channel Map Format
//!
//! The channel map is a CSV file with *no* whitespaces. The columns are as
//! follows:
//!
//! ```csv
//! raw_channel,detector,element,x,y,z
//! ```
//!
//! The detector keyword is one of `cb`, `pid`, `taps`, `taps_veto`; the
//! element is the index within that subsystem and x/y/z the element position
//! in cm.
//!
//! ## Diagnostics
//!
//! Everything recoverable that goes wrong while decoding (corrupt event
//! blocks, truncated records, trigger-id gaps, unmapped channels, missing
//! calibration entries) surfaces as an `UnpackerMessage`, attached either to
//! the affected event or to the unpacker's out-of-band queue. Dropped data is
//! always accounted for by a message, never silent.
pub mod acqu_format;
pub mod calibrate;
pub mod calibration;
pub mod candidate_builder;
pub mod channel_map;
pub mod clustering;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod geant_format;
pub mod hook;
pub mod message;
pub mod process;
pub mod reconstruct;
pub mod record_reader;
pub mod sink;
pub mod tid;
pub mod unpacker;
pub mod worker_status;
