use std::io::Read;

use super::constants::*;
use super::error::{RecordReaderError, UnpackerError};
use super::event::{RawEventBlock, RawHit};
use super::message::{DiagnosticCode, MessageLevel, UnpackerMessage};
use super::record_reader::{Record, RecordReader};
use super::tid::{Tid, TID_FLAG_MC};

/// Run metadata from the A2Geant file header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeantHeader {
    pub version: u32,
    pub run_number: u32,
}

/// Decoder for the Monte-Carlo-generated equivalent stream.
///
/// The simulation writes an already-demultiplexed format: one record per
/// event, each holding `[counter][nhits]` followed by
/// `(channel, energy_raw, time_raw)` word triples. Energy is written in
/// 100 keV and time in 0.1 ns integer units so the ordinary coefficient
/// pipeline applies downstream. The output block shape is identical to the
/// Acqu variant's, which keeps the reconstruction format-agnostic.
#[derive(Debug)]
pub struct GeantFormat<R: Read> {
    reader: RecordReader<R>,
    header: GeantHeader,
    pending_messages: Vec<UnpackerMessage>,
    last_counter: Option<u32>,
    exhausted: bool,
}

impl<R: Read> GeantFormat<R> {
    pub fn new(reader: RecordReader<R>, header_record: &Record) -> Result<Self, UnpackerError> {
        let words = header_record.words();
        if words.len() != 3 || words[0] != GEANT_MAGIC {
            return Err(UnpackerError::BadHeader(
                "A2Geant header record malformed".to_string(),
            ));
        }
        let header = GeantHeader {
            version: words[1],
            run_number: words[2],
        };
        spdlog::info!(
            "Opened A2Geant run {} (version {})",
            header.run_number,
            header.version
        );
        let pending_messages = vec![UnpackerMessage::new(
            MessageLevel::Info,
            DiagnosticCode::HeaderInfo,
            format!(
                "A2Geant header: version={} run={}",
                header.version, header.run_number
            ),
        )];
        Ok(Self {
            reader,
            header,
            pending_messages,
            last_counter: None,
            exhausted: false,
        })
    }

    pub fn header(&self) -> &GeantHeader {
        &self.header
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    pub fn total_size(&self) -> Option<u64> {
        self.reader.total_size()
    }

    pub fn drain_messages(&mut self) -> Vec<UnpackerMessage> {
        std::mem::take(&mut self.pending_messages)
    }

    pub fn next_event(&mut self) -> Result<Option<RawEventBlock>, UnpackerError> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            let record = match self.reader.next_record() {
                Ok(Some(r)) => r,
                Ok(None) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(RecordReaderError::TruncatedRecord { expected, got }) => {
                    self.pending_messages.push(UnpackerMessage::new(
                        MessageLevel::DataError,
                        DiagnosticCode::TruncatedRecord,
                        format!(
                            "MC event record truncated at end of file: {got} of {expected} payload bytes"
                        ),
                    ));
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(e) => return Err(UnpackerError::RecordError(e)),
            };
            if record.marker != EGEANT_EVENT {
                self.pending_messages.push(UnpackerMessage::new(
                    MessageLevel::DataError,
                    DiagnosticCode::CorruptEventBlock,
                    format!(
                        "Skipping record with unexpected marker 0x{:08x} inside MC stream",
                        record.marker
                    ),
                ));
                continue;
            }

            let words = record.words();
            if words.len() < 2 {
                self.pending_messages.push(UnpackerMessage::new(
                    MessageLevel::DataError,
                    DiagnosticCode::CorruptEventBlock,
                    "MC event record too short for its own header".to_string(),
                ));
                continue;
            }
            let counter = words[0];
            let n_hits = words[1] as usize;
            if words.len() != 2 + 3 * n_hits {
                self.pending_messages.push(UnpackerMessage::new(
                    MessageLevel::DataError,
                    DiagnosticCode::CorruptEventBlock,
                    format!(
                        "MC event {counter} declares {n_hits} hits but record holds {} words",
                        words.len()
                    ),
                ));
                continue;
            }
            if let Some(last) = self.last_counter {
                if counter < last {
                    self.pending_messages.push(UnpackerMessage::new(
                        MessageLevel::DataError,
                        DiagnosticCode::CorruptEventBlock,
                        format!("MC event counter regressed from {last} to {counter}, skipping"),
                    ));
                    continue;
                }
            }
            self.last_counter = Some(counter);

            let tid = Tid::with_flags(self.header.run_number, counter, TID_FLAG_MC);
            let mut block = RawEventBlock::new(tid);
            for triple in words[2..].chunks_exact(3) {
                block.hits.push(RawHit {
                    channel: (triple[0] & 0xFFFF) as u16,
                    values: vec![(triple[1] & 0xFFFF) as u16, (triple[2] & 0xFFFF) as u16],
                });
            }
            if !self.pending_messages.is_empty() {
                let mut pending = std::mem::take(&mut self.pending_messages);
                block.messages.append(&mut pending);
            }
            return Ok(Some(block));
        }
    }
}
