use std::fmt::Display;

use super::tid::Tid;

/// Severity of a decoding diagnostic, ordered from least to most severe.
///
/// `DataError` marks dropped or corrupted payload data; `Error` marks a
/// violated stream grammar, a mark word where none belongs. Neither aborts
/// the run, that is what the fatal error types are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Info,
    Warn,
    DataError,
    Error,
}

impl Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Warn => write!(f, "warn"),
            MessageLevel::DataError => write!(f, "data error"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

/// Machine-matchable classification of a diagnostic, so downstream quality
/// checks do not have to parse the free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// File header summary emitted once per opened stream.
    HeaderInfo,
    /// An event block violated the event grammar and was skipped.
    CorruptEventBlock,
    /// A record held fewer payload bytes than it declared.
    TruncatedRecord,
    /// The trigger counter jumped forward; the DAQ dropped triggers.
    TidGap,
    /// A raw channel has no channel map entry.
    UnmappedChannel,
    /// A hit could not be calibrated and was masked.
    UnresolvedCalibration,
    /// Per-channel values did not chunk into the declared word count.
    HitReassembly,
    /// A scaler sub-block violated its framing.
    ScalerBlockMalformed,
    /// A stateful hook has not seen enough events yet; outputs degraded.
    HookWarmUp,
}

/// One diagnostic produced while decoding or reconstructing.
///
/// Messages attributed to an event travel with it (see
/// [`crate::event::RawEventBlock::messages`]); file-level messages queue on
/// the unpacker until drained.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackerMessage {
    pub tid: Option<Tid>,
    pub level: MessageLevel,
    pub code: DiagnosticCode,
    pub text: String,
}

impl UnpackerMessage {
    pub fn new(level: MessageLevel, code: DiagnosticCode, text: String) -> Self {
        Self {
            tid: None,
            level,
            code,
            text,
        }
    }

    pub fn for_tid(tid: Tid, level: MessageLevel, code: DiagnosticCode, text: String) -> Self {
        Self {
            tid: Some(tid),
            level,
            code,
            text,
        }
    }
}

impl Display for UnpackerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tid {
            Some(tid) => write!(f, "[{}] {}: {}", self.level, tid, self.text),
            None => write!(f, "[{}] {}", self.level, self.text),
        }
    }
}
