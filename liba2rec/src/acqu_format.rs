use std::collections::VecDeque;
use std::io::Read;

use fxhash::FxHashMap;

use super::constants::*;
use super::error::{RecordReaderError, UnpackerError};
use super::event::{DaqError, RawEventBlock, RawHit, SlowControl};
use super::message::{DiagnosticCode, MessageLevel, UnpackerMessage};
use super::record_reader::{Record, RecordReader};
use super::tid::{Tid, TID_FLAG_OUT_OF_ORDER};

/// One entry of the header module table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: u32,
    pub first_channel: u32,
    pub n_channels: u32,
    /// Declared number of raw words per value read from this module
    /// (e.g. 2 for an ADC/TDC pair).
    pub words_per_value: u32,
}

impl ModuleInfo {
    fn covers(&self, channel: u16) -> bool {
        let ch = channel as u32;
        self.first_channel <= ch && ch < self.first_channel + self.n_channels
    }
}

/// Run metadata from the Acqu file header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquHeader {
    pub format_version: u32,
    pub run_number: u32,
    /// Declared payload length of the data records, in bytes.
    pub record_length: u32,
    pub modules: Vec<ModuleInfo>,
}

/// Decoder for the Acqu wire format.
///
/// The stream is organized as nested framed blocks: the header record carries
/// the format version and module table, then data records hold a continuous
/// word stream of event blocks. One event block is
/// `[counter][length][content ... EEND_EVENT]` where `length` counts the
/// content words including the terminator. Content words are plain
/// `(channel << 16 | value)` hits, length-framed scaler sub-blocks and 3-word
/// DAQ error records.
///
/// Event blocks routinely straddle record boundaries, so decoding runs over
/// a word buffer refilled from the record reader; a record boundary is never
/// assumed to be an event boundary.
#[derive(Debug)]
pub struct AcquFormat<R: Read> {
    reader: RecordReader<R>,
    header: AcquHeader,
    buffer: VecDeque<u32>,
    /// Set once the underlying record stream has ended (cleanly or not).
    exhausted: bool,
    /// Within one event, raw values arrive in any order and a channel may be
    /// read several times. Collected here, then reassembled per the module
    /// table. Member to reuse the allocation across events.
    hit_storage: FxHashMap<u16, Vec<u16>>,
    /// Messages not yet attributed to an emitted block.
    pending_messages: Vec<UnpackerMessage>,
    last_counter: Option<u32>,
}

impl<R: Read> AcquFormat<R> {
    /// Build the decoder from an already-consumed header record.
    pub fn new(reader: RecordReader<R>, header_record: &Record) -> Result<Self, UnpackerError> {
        let header = Self::parse_header(header_record)?;
        let mut pending_messages = Vec::new();
        pending_messages.push(UnpackerMessage::new(
            MessageLevel::Info,
            DiagnosticCode::HeaderInfo,
            format!(
                "Acqu header: version={} run={} record_length={} modules={}",
                header.format_version,
                header.run_number,
                header.record_length,
                header.modules.len()
            ),
        ));
        spdlog::info!(
            "Opened Acqu run {} (format version {}, {} modules)",
            header.run_number,
            header.format_version,
            header.modules.len()
        );
        Ok(Self {
            reader,
            header,
            buffer: VecDeque::new(),
            exhausted: false,
            hit_storage: FxHashMap::default(),
            pending_messages,
            last_counter: None,
        })
    }

    fn parse_header(record: &Record) -> Result<AcquHeader, UnpackerError> {
        let words = record.words();
        if words.len() < 4 {
            return Err(UnpackerError::BadHeader(format!(
                "header record has only {} words",
                words.len()
            )));
        }
        let format_version = words[0];
        if format_version != ACQU_MK2_VERSION {
            return Err(UnpackerError::BadHeader(format!(
                "unsupported Acqu format version {format_version}"
            )));
        }
        let run_number = words[1];
        let record_length = words[2];
        let n_modules = words[3] as usize;
        if words.len() != 4 + n_modules * MODULE_TABLE_WORDS {
            return Err(UnpackerError::BadHeader(format!(
                "module table truncated: header declares {} modules but record holds {} words",
                n_modules,
                words.len()
            )));
        }
        let mut modules = Vec::with_capacity(n_modules);
        for i in 0..n_modules {
            let base = 4 + i * MODULE_TABLE_WORDS;
            let module = ModuleInfo {
                id: words[base],
                first_channel: words[base + 1],
                n_channels: words[base + 2],
                words_per_value: words[base + 3].max(1),
            };
            modules.push(module);
        }
        Ok(AcquHeader {
            format_version,
            run_number,
            record_length,
            modules,
        })
    }

    pub fn header(&self) -> &AcquHeader {
        &self.header
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    pub fn total_size(&self) -> Option<u64> {
        self.reader.total_size()
    }

    /// File-level diagnostics not tied to any emitted event block.
    pub fn drain_messages(&mut self) -> Vec<UnpackerMessage> {
        std::mem::take(&mut self.pending_messages)
    }

    fn push_message(&mut self, level: MessageLevel, code: DiagnosticCode, text: String) {
        self.pending_messages
            .push(UnpackerMessage::new(level, code, text));
    }

    /// Refill the word buffer until it holds at least `n` words.
    ///
    /// Returns false if the stream ended first. Truncated records are
    /// acceptable at the natural end of the file: the partial payload is
    /// discarded with a diagnostic and the stream is marked exhausted. A
    /// desynchronized marker pattern stays fatal.
    fn ensure_words(&mut self, n: usize) -> Result<bool, UnpackerError> {
        while self.buffer.len() < n {
            if self.exhausted {
                return Ok(false);
            }
            match self.reader.next_record() {
                Ok(Some(record)) => {
                    if record.marker != EDATABUFF {
                        self.push_message(
                            MessageLevel::DataError,
                            DiagnosticCode::CorruptEventBlock,
                            format!(
                                "Skipping record with unexpected marker 0x{:08x} inside data stream",
                                record.marker
                            ),
                        );
                        continue;
                    }
                    self.buffer.extend(record.words());
                }
                Ok(None) => self.exhausted = true,
                Err(RecordReaderError::TruncatedRecord { expected, got }) => {
                    self.push_message(
                        MessageLevel::DataError,
                        DiagnosticCode::TruncatedRecord,
                        format!(
                            "Data record truncated at end of file: {got} of {expected} payload bytes"
                        ),
                    );
                    self.exhausted = true;
                }
                Err(e) => return Err(UnpackerError::RecordError(e)),
            }
        }
        Ok(true)
    }

    /// Drop words until an event terminator has been consumed, refilling as
    /// needed. Used to reacquire the event grammar after a corrupt block.
    fn resynchronize(&mut self) -> Result<(), UnpackerError> {
        loop {
            if !self.ensure_words(1)? {
                self.buffer.clear();
                return Ok(());
            }
            if let Some(word) = self.buffer.pop_front() {
                if word == EEND_EVENT {
                    return Ok(());
                }
            }
        }
    }

    /// Pull the next raw event block from the stream.
    ///
    /// Corrupt event blocks are skipped with a diagnostic; only a
    /// desynchronized record stream aborts decoding.
    pub fn next_event(&mut self) -> Result<Option<RawEventBlock>, UnpackerError> {
        loop {
            if !self.ensure_words(2)? {
                return Ok(self.finish_stream());
            }
            let counter = self.buffer[0];
            let length = self.buffer[1];

            if length == 0 || length > MAX_EVENT_WORDS {
                self.push_message(
                    MessageLevel::DataError,
                    DiagnosticCode::CorruptEventBlock,
                    format!("Event {counter} declares implausible length {length}, skipping to next terminator"),
                );
                self.buffer.pop_front();
                self.buffer.pop_front();
                self.resynchronize()?;
                continue;
            }

            let total = 2 + length as usize;
            if !self.ensure_words(total)? {
                self.push_message(
                    MessageLevel::DataError,
                    DiagnosticCode::TruncatedRecord,
                    format!(
                        "Stream ended inside event {counter}: have {} of {total} words",
                        self.buffer.len()
                    ),
                );
                self.buffer.clear();
                return Ok(self.finish_stream());
            }

            // pop the whole event extent out of the running buffer
            let words: Vec<u32> = self.buffer.drain(..total).collect();
            if words[total - 1] != EEND_EVENT {
                // a mark word out of place means the event grammar itself is
                // violated, not just the payload
                self.push_message(
                    MessageLevel::Error,
                    DiagnosticCode::CorruptEventBlock,
                    format!(
                        "Event {counter} not terminated by end-of-event mark, found 0x{:08x}",
                        words[total - 1]
                    ),
                );
                // the declared extent cannot be trusted; the popped words are
                // dropped and the grammar reacquired at the next terminator
                self.resynchronize()?;
                continue;
            }

            let tid = Tid::new(self.header.run_number, counter);
            let mut block = RawEventBlock::new(tid);
            if let Err(text) = self.parse_event_content(tid, &words[2..total - 1], &mut block) {
                self.push_message(MessageLevel::Error, DiagnosticCode::CorruptEventBlock, text);
                continue;
            }

            // scaler-only reads arrive on their own trigger and are exempt
            // from the ordering invariant
            if block.hits.is_empty() && !block.slow_controls.is_empty() {
                let flagged = Tid::with_flags(tid.run, tid.counter, TID_FLAG_OUT_OF_ORDER);
                block.tid = Some(flagged);
                for sc in &mut block.slow_controls {
                    sc.tid = flagged;
                }
            } else {
                match self.last_counter {
                    Some(last) if counter < last => {
                        self.push_message(
                            MessageLevel::DataError,
                            DiagnosticCode::CorruptEventBlock,
                            format!("Event counter regressed from {last} to {counter}, skipping block"),
                        );
                        continue;
                    }
                    Some(last) if counter > last + 1 => {
                        block.messages.push(UnpackerMessage::for_tid(
                            tid,
                            MessageLevel::Info,
                            DiagnosticCode::TidGap,
                            format!(
                                "{} triggers dropped between events {last} and {counter}",
                                counter - last - 1
                            ),
                        ));
                        self.last_counter = Some(counter);
                    }
                    _ => self.last_counter = Some(counter),
                }
            }

            // deliver diagnostics accumulated since the last good block
            if !self.pending_messages.is_empty() {
                let mut pending = std::mem::take(&mut self.pending_messages);
                block.messages.append(&mut pending);
            }
            return Ok(Some(block));
        }
    }

    /// Clean end of stream. Any leftover diagnostics stay in the pending
    /// queue for `drain_messages`.
    fn finish_stream(&mut self) -> Option<RawEventBlock> {
        None
    }

    /// Decode the content words of one event block. On a grammar violation
    /// the whole block is abandoned (the caller skips it); everything decoded
    /// so far is discarded.
    fn parse_event_content(
        &mut self,
        tid: Tid,
        content: &[u32],
        block: &mut RawEventBlock,
    ) -> Result<(), String> {
        self.hit_storage.clear();
        let mut idx = 0usize;
        while idx < content.len() {
            match content[idx] {
                ESCALER => {
                    idx = Self::parse_scaler_block(tid, content, idx, block)?;
                }
                EREAD_ERROR => {
                    idx = Self::parse_daq_error(content, idx, content.len(), block)?;
                }
                word => {
                    // plain hits carry no marker; channel in the high half,
                    // value in the low half
                    let channel = (word >> 16) as u16;
                    let value = (word & 0xFFFF) as u16;
                    self.hit_storage.entry(channel).or_default().push(value);
                    idx += 1;
                }
            }
        }
        self.assemble_hits(tid, block);
        Ok(())
    }

    /// `[ESCALER][length_bytes][content ...][ESCALER]` where the content may
    /// embed DAQ error records between the (index, value) pairs.
    fn parse_scaler_block(
        tid: Tid,
        content: &[u32],
        start: usize,
        block: &mut RawEventBlock,
    ) -> Result<usize, String> {
        let mut idx = start + 1;
        if idx >= content.len() {
            return Err("Scaler block has only a start marker".to_string());
        }
        let length_bytes = content[idx] as usize;
        if length_bytes % WORD_SIZE != 0 {
            return Err(format!("Scaler block length {length_bytes} not word aligned"));
        }
        let n_words = length_bytes / WORD_SIZE;
        let end = idx + 1 + n_words;
        if end >= content.len() {
            return Err("Scaler block length exceeds event extent".to_string());
        }
        if content[end] != ESCALER {
            return Err(format!(
                "Scaler block did not have proper end marker: 0x{:08x}",
                content[end]
            ));
        }
        idx += 1;
        while idx < end {
            if content[idx] == EREAD_ERROR {
                // the record must fit inside the frame, never swallow the
                // frame's end marker
                idx = Self::parse_daq_error(content, idx, end, block)?;
                continue;
            }
            if end - idx < 2 {
                return Err("Scaler block contains malformed scaler read".to_string());
            }
            block.slow_controls.push(SlowControl {
                tid,
                index: content[idx],
                value: content[idx + 1],
            });
            idx += 2;
        }
        Ok(end + 1)
    }

    /// `[EREAD_ERROR][module id][module index][error code]`, bounded by the
    /// extent of the enclosing block.
    fn parse_daq_error(
        content: &[u32],
        start: usize,
        end: usize,
        block: &mut RawEventBlock,
    ) -> Result<usize, String> {
        if end - start < 4 {
            return Err("DAQ error record truncated".to_string());
        }
        block.daq_errors.push(DaqError {
            module_id: content[start + 1],
            module_index: content[start + 2],
            error_code: content[start + 3],
        });
        Ok(start + 4)
    }

    /// Reassemble the collected per-channel values into raw hits using the
    /// declared word count of the owning module. Channels are emitted in
    /// ascending order so the output is reproducible.
    fn assemble_hits(&mut self, tid: Tid, block: &mut RawEventBlock) {
        let mut channels: Vec<u16> = self.hit_storage.keys().copied().collect();
        channels.sort_unstable();
        for channel in channels {
            let values = &self.hit_storage[&channel];
            let words = self
                .header
                .modules
                .iter()
                .find(|m| m.covers(channel))
                .map(|m| m.words_per_value as usize)
                .unwrap_or(1);
            for chunk in values.chunks(words) {
                if chunk.len() != words {
                    block.messages.push(UnpackerMessage::for_tid(
                        tid,
                        MessageLevel::DataError,
                        DiagnosticCode::HitReassembly,
                        format!(
                            "Channel {channel} read {} values, not a multiple of the declared word count {words}",
                            values.len()
                        ),
                    ));
                }
                block.hits.push(RawHit {
                    channel,
                    values: chunk.to_vec(),
                });
            }
        }
    }
}
