use std::sync::Arc;

use super::calibration::CalibrationProvider;
use super::channel_map::ChannelMap;
use super::error::ReconstructError;
use super::event::{EventData, RawEventBlock};
use super::hook::{EventAssembly, HookChain};
use super::message::MessageLevel;
use super::sink::EventSink;
use super::unpacker::Unpacker;

/// Counters describing one completed pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub data_errors: u64,
}

/// The reconstruction orchestrator.
///
/// Pulls raw event blocks from an unpacker, maps channels, runs the hook
/// chain and emits one finalized [`EventData`] per trigger. A single event's
/// problems never abort the run: the event is emitted degraded, with its
/// diagnostics attached. Events are processed strictly one at a time since
/// hooks may carry sequential state.
pub struct Reconstruct {
    chain: HookChain,
    channel_map: ChannelMap,
    calibration: Arc<dyn CalibrationProvider>,
}

impl Reconstruct {
    pub fn new(
        chain: HookChain,
        channel_map: ChannelMap,
        calibration: Arc<dyn CalibrationProvider>,
    ) -> Self {
        Self {
            chain,
            channel_map,
            calibration,
        }
    }

    /// Run the hook chain over one raw block.
    pub fn process_block(&mut self, block: RawEventBlock) -> EventData {
        let mut assembly = EventAssembly::from_block(block, &self.channel_map);
        self.chain.run(&mut assembly, self.calibration.as_ref());
        assembly.finalize()
    }

    /// Drive the full pull pipeline until the unpacker is exhausted, pushing
    /// every finalized event into the sink.
    pub fn run(
        &mut self,
        unpacker: &mut Unpacker<impl std::io::Read>,
        sink: &mut dyn EventSink,
    ) -> Result<RunSummary, ReconstructError> {
        let mut summary = RunSummary::default();
        while let Some(block) = unpacker.next_event()? {
            let event = self.process_block(block);
            summary.events += 1;
            for message in &event.diagnostics {
                if message.level >= MessageLevel::DataError {
                    summary.data_errors += 1;
                    spdlog::warn!("{}", message);
                }
            }
            sink.push(event)?;
        }
        for message in unpacker.drain_messages() {
            if message.level >= MessageLevel::DataError {
                summary.data_errors += 1;
                spdlog::warn!("{}", message);
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationFile;
    use crate::config::ReconstructionParams;
    use crate::constants::{ACQU_MK2_VERSION, EDATABUFF, EEND_EVENT, EHEAD, WORD_SIZE};
    use crate::event::{DetectorType, RawEventBlock, RawHit};
    use crate::hook::HookChainBuilder;
    use crate::message::DiagnosticCode;
    use crate::record_reader::RecordReader;
    use crate::sink::MemorySink;
    use crate::tid::Tid;
    use byteorder::{LittleEndian, WriteBytesExt};

    // run 7; cb elements 0 and 1, pid element 0
    const CALIB_YAML: &str = "
runs:
  - run: 7
    windows:
      - first_counter: 0
        last_counter: 4294967295
        channels:
          - detector: cb
            element: 0
            pedestal: 100.0
            gain: 0.5
            time_offset: -50.0
            time_gain: 0.1
          - detector: cb
            element: 1
            pedestal: 100.0
            gain: 0.5
            time_offset: -50.0
            time_gain: 0.1
          - detector: pid
            element: 0
            pedestal: 100.0
            gain: 0.02
            time_offset: -50.0
            time_gain: 0.1
";

    fn encode_record(marker: u32, words: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(marker).unwrap();
        bytes
            .write_u32::<LittleEndian>((words.len() * WORD_SIZE) as u32)
            .unwrap();
        for w in words {
            bytes.write_u32::<LittleEndian>(*w).unwrap();
        }
        bytes
    }

    fn hit(channel: u16, value: u16) -> u32 {
        ((channel as u32) << 16) | value as u32
    }

    fn event_words(counter: u32, content: &[u32]) -> Vec<u32> {
        let mut words = vec![counter, (content.len() + 1) as u32];
        words.extend_from_slice(content);
        words.push(EEND_EVENT);
        words
    }

    /// Acqu stream of run 7 with one module covering all 72 mapped channels,
    /// two raw words (ADC, TDC) per value.
    fn acqu_stream(events: Vec<Vec<u32>>) -> Unpacker<std::io::Cursor<Vec<u8>>> {
        let mut bytes = encode_record(EHEAD, &[ACQU_MK2_VERSION, 7, 0x200, 1, 0x101, 0, 72, 2]);
        for event in events {
            bytes.extend(encode_record(EDATABUFF, &event));
        }
        let reader = RecordReader::from_reader(std::io::Cursor::new(bytes));
        Unpacker::from_record_reader(reader).unwrap()
    }

    fn reconstruct() -> Reconstruct {
        let chain = HookChainBuilder::new(ReconstructionParams::default()).build();
        let channel_map = ChannelMap::new(None).unwrap();
        let calibration: Arc<dyn CalibrationProvider> =
            Arc::new(CalibrationFile::from_yaml(CALIB_YAML).unwrap());
        Reconstruct::new(chain, channel_map, calibration)
    }

    #[test]
    fn test_end_to_end_candidates() {
        // event 0: cb element 0 plus pid element 0, both at phi = 0
        // event 1: cb element 1 alone
        let mut unpacker = acqu_stream(vec![
            event_words(
                0,
                &[hit(0, 300), hit(0, 600), hit(32, 300), hit(32, 600)],
            ),
            event_words(1, &[hit(1, 300), hit(1, 600)]),
        ]);
        let mut sink = MemorySink::new();
        let summary = reconstruct().run(&mut unpacker, &mut sink).unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.data_errors, 0);
        assert_eq!(sink.events.len(), 2);

        let charged = &sink.events[0];
        assert_eq!(charged.candidates.len(), 1);
        let candidate = &charged.candidates[0];
        assert!(candidate.detectors.has(DetectorType::Cb));
        assert!(candidate.detectors.has(DetectorType::Pid));
        assert_eq!(candidate.energy, 100.0);
        assert_eq!(candidate.time, 10.0);
        assert_eq!(candidate.veto_energy, Some(4.0));
        assert!(charged.unmatched_clusters.is_empty());

        let neutral = &sink.events[1];
        assert_eq!(neutral.candidates.len(), 1);
        assert_eq!(neutral.candidates[0].veto_energy, None);
    }

    #[test]
    fn test_emitted_tids_are_monotonic() {
        let mut unpacker = acqu_stream(vec![
            event_words(0, &[hit(0, 300), hit(0, 600)]),
            event_words(1, &[hit(0, 310), hit(0, 600)]),
            event_words(4, &[hit(0, 320), hit(0, 600)]),
        ]);
        let mut sink = MemorySink::new();
        reconstruct().run(&mut unpacker, &mut sink).unwrap();
        assert_eq!(sink.events.len(), 3);
        for pair in sink.events.windows(2) {
            assert!(pair[0].tid < pair[1].tid);
        }
    }

    #[test]
    fn test_process_block_is_idempotent() {
        let mut block = RawEventBlock::new(Tid::new(7, 0));
        block.hits = vec![
            RawHit {
                channel: 0,
                values: vec![300, 600],
            },
            RawHit {
                channel: 32,
                values: vec![300, 600],
            },
        ];
        let mut reconstruct = reconstruct();
        let first = reconstruct.process_block(block.clone());
        let second = reconstruct.process_block(block);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unmapped_channel_degrades_event_only() {
        // channel 4095 does not exist in the default map; the event still
        // comes out, with its cb candidate and the diagnostics attached
        let mut unpacker = acqu_stream(vec![event_words(
            0,
            &[hit(0, 300), hit(0, 600), hit(4095, 4095)],
        )]);
        let mut sink = MemorySink::new();
        reconstruct().run(&mut unpacker, &mut sink).unwrap();
        assert_eq!(sink.events.len(), 1);
        let event = &sink.events[0];
        assert_eq!(event.candidates.len(), 1);
        assert!(event
            .diagnostics
            .iter()
            .any(|m| m.code == DiagnosticCode::UnmappedChannel));
        assert!(event
            .diagnostics
            .iter()
            .any(|m| m.code == DiagnosticCode::UnresolvedCalibration));
    }
}
