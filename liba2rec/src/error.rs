use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum RecordReaderError {
    #[error("Could not open raw file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Record declared {expected} payload bytes but only {got} remain in the stream")]
    TruncatedRecord { expected: usize, got: usize },
    #[error("Lost synchronization on the record marker pattern: found word 0x{marker:08x} at byte offset {position}")]
    DesynchronizedStream { marker: u32, position: u64 },
    #[error("Record declared payload length {0} which is not a multiple of the word size")]
    OddRecordLength(u32),
    #[error("RecordReader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UnpackerError {
    #[error("No unpacker variant matched the header signature of file {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("Unpacker found a malformed file header: {0}")]
    BadHeader(String),
    #[error("Unpacker failed due to RecordReader error: {0}")]
    RecordError(#[from] RecordReaderError),
    #[error("Unpacker failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Found invalid detector keyword: {0}")]
    InvalidKeyword(String),
}

#[derive(Debug, Error)]
pub enum ChannelMapError {
    #[error("ChannelMap failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ChannelMap failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("ChannelMap failed to parse a coordinate: {0}")]
    CoordinateError(#[from] std::num::ParseFloatError),
    #[error("ChannelMap failed to parse a detector keyword: {0}")]
    BadDetKeyword(#[from] DetectorError),
    #[error("ChannelMap was given a file with the incorrect format; most likely the number of columns is incorrect")]
    BadFileFormat,
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Could not load calibration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("EventSink failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EventSink rejected an event: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("Reconstruct failed due to Unpacker error: {0}")]
    UnpackerError(#[from] UnpackerError),
    #[error("Reconstruct failed due to EventSink error: {0}")]
    SinkError(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to ChannelMap error: {0}")]
    MapError(#[from] ChannelMapError),
    #[error("Processor failed due to Calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
    #[error("Processor failed due to Unpacker error: {0}")]
    UnpackerError(#[from] UnpackerError),
    #[error("Processor failed due to Reconstruct error: {0}")]
    ReconstructError(#[from] ReconstructError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
