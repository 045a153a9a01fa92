use super::error::SinkError;
use super::event::EventData;
use super::message::MessageLevel;

/// Consumer of finished events. Persistence and plotting live behind this
/// seam; the pipeline only ever pushes and the sink's pace throttles the
/// whole pull chain.
pub trait EventSink {
    fn push(&mut self, event: EventData) -> Result<(), SinkError>;
}

/// Collects events in memory. Test and small-sample use.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<EventData>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for MemorySink {
    fn push(&mut self, event: EventData) -> Result<(), SinkError> {
        self.events.push(event);
        Ok(())
    }
}

/// Counts what passes through and logs a run summary. Used by the CLI
/// driver, where the real consumers live downstream of the log.
#[derive(Debug, Default)]
pub struct SummarySink {
    pub events: u64,
    pub candidates: u64,
    pub slow_controls: u64,
    pub daq_errors: u64,
    pub degraded_events: u64,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        spdlog::info!(
            "Run summary: {} events, {} candidates, {} slow-control reads, {} DAQ errors, {} degraded events",
            self.events,
            self.candidates,
            self.slow_controls,
            self.daq_errors,
            self.degraded_events
        );
    }
}

impl EventSink for SummarySink {
    fn push(&mut self, event: EventData) -> Result<(), SinkError> {
        self.events += 1;
        self.candidates += event.candidates.len() as u64;
        self.slow_controls += event.slow_controls.len() as u64;
        self.daq_errors += event.daq_errors.len() as u64;
        if event
            .diagnostics
            .iter()
            .any(|m| m.level >= MessageLevel::Warn)
        {
            self.degraded_events += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DiagnosticCode, UnpackerMessage};
    use crate::tid::Tid;

    fn event(tid: Tid, diagnostics: Vec<UnpackerMessage>) -> EventData {
        EventData {
            tid,
            candidates: Vec::new(),
            unmatched_clusters: Vec::new(),
            slow_controls: Vec::new(),
            daq_errors: Vec::new(),
            diagnostics,
        }
    }

    #[test]
    fn test_summary_counts_degraded_events() {
        let mut sink = SummarySink::new();
        sink.push(event(Tid::new(4, 0), Vec::new())).unwrap();
        // informational diagnostics do not degrade an event
        sink.push(event(
            Tid::new(4, 1),
            vec![UnpackerMessage::new(
                MessageLevel::Info,
                DiagnosticCode::TidGap,
                "1 trigger dropped".to_string(),
            )],
        ))
        .unwrap();
        sink.push(event(
            Tid::new(4, 2),
            vec![UnpackerMessage::new(
                MessageLevel::Warn,
                DiagnosticCode::UnmappedChannel,
                "channel 4095 unmapped".to_string(),
            )],
        ))
        .unwrap();
        assert_eq!(sink.events, 3);
        assert_eq!(sink.degraded_events, 1);
    }
}
