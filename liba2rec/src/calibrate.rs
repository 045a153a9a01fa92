use fxhash::FxHashMap;

use super::calibration::CalibrationProvider;
use super::event::{ClusterHit, DetectorType};
use super::hook::{EventAssembly, ReadHitsHook};
use super::message::{DiagnosticCode, MessageLevel, UnpackerMessage};

/// The built-in calibration stage: DetectorReadHits in, ClusterHits out.
///
/// Each read hit is converted with the coefficients valid at the event's Tid.
/// A hit whose channel resolves to no coefficients (or to no detector at all)
/// is masked out of the calibrated set, and the event's error list gains an
/// `UnresolvedCalibration` entry. Masking is never fatal.
#[derive(Debug, Default)]
pub struct CalibrationHook {}

impl CalibrationHook {
    pub fn new() -> Self {
        Self {}
    }

    pub fn apply(&self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider) {
        let tid = assembly.tid;
        // an upstream stateful hook still warming up degrades every
        // calibrated hit of this event
        let warmup = assembly
            .diagnostics
            .iter()
            .any(|m| m.code == DiagnosticCode::HookWarmUp);
        for hit in &assembly.read_hits {
            if hit.detector == DetectorType::Unknown {
                assembly.diagnostics.push(UnpackerMessage::for_tid(
                    tid,
                    MessageLevel::Warn,
                    DiagnosticCode::UnresolvedCalibration,
                    format!(
                        "Channel {} (raw value {}) has no detector element, masked from calibration",
                        hit.channel,
                        hit.values.first().copied().unwrap_or(0)
                    ),
                ));
                continue;
            }
            let Some(coefficients) = calibration.get(hit.detector, hit.element, &tid) else {
                assembly.diagnostics.push(UnpackerMessage::for_tid(
                    tid,
                    MessageLevel::Warn,
                    DiagnosticCode::UnresolvedCalibration,
                    format!(
                        "No calibration entry for {} element {} at {}, hit masked",
                        hit.detector, hit.element, tid
                    ),
                ));
                continue;
            };
            let Some(raw_energy) = hit.values.first() else {
                assembly.diagnostics.push(UnpackerMessage::for_tid(
                    tid,
                    MessageLevel::DataError,
                    DiagnosticCode::HitReassembly,
                    format!("Channel {} carried no raw values, hit masked", hit.channel),
                ));
                continue;
            };
            let energy = coefficients.energy(*raw_energy);
            let time = match hit.values.get(1) {
                Some(raw) => coefficients.time(*raw),
                None => f64::NAN,
            };
            assembly.cluster_hits.push(ClusterHit {
                detector: hit.detector,
                element: hit.element,
                channel: hit.channel,
                position: hit.position,
                energy,
                time,
                low_confidence: warmup,
            });
        }
    }
}

/// Running pedestal estimation over the event stream.
///
/// Declared-stateful read-hits hook: it accumulates a per-channel mean of the
/// first raw word and writes the estimate back as a correction baseline.
/// Warm-up contract: during the first `warmup_events` events the estimate is
/// statistically weak, so the hook attaches one `HookWarmUp` diagnostic per
/// event and the calibrated hits of those events are marked low-confidence
/// downstream; outputs are degraded, never silently wrong.
#[derive(Debug)]
pub struct PedestalAverageHook {
    warmup_events: u32,
    events_seen: u32,
    sums: FxHashMap<u16, (u64, u64)>,
}

impl PedestalAverageHook {
    pub fn new(warmup_events: u32) -> Self {
        Self {
            warmup_events,
            events_seen: 0,
            sums: FxHashMap::default(),
        }
    }

    pub fn in_warmup(&self) -> bool {
        self.events_seen < self.warmup_events
    }

    pub fn pedestal(&self, channel: u16) -> Option<f64> {
        self.sums
            .get(&channel)
            .map(|(sum, count)| *sum as f64 / *count as f64)
    }
}

impl ReadHitsHook for PedestalAverageHook {
    fn name(&self) -> &'static str {
        "pedestal_average"
    }

    fn process(&mut self, assembly: &mut EventAssembly, _calibration: &dyn CalibrationProvider) {
        // the window covers the first warmup_events events, this one included
        let warming = self.in_warmup();
        for hit in &assembly.read_hits {
            if let Some(raw) = hit.values.first() {
                let entry = self.sums.entry(hit.channel).or_insert((0, 0));
                entry.0 += *raw as u64;
                entry.1 += 1;
            }
        }
        self.events_seen += 1;
        if warming {
            assembly.diagnostics.push(UnpackerMessage::for_tid(
                assembly.tid,
                MessageLevel::Info,
                DiagnosticCode::HookWarmUp,
                format!(
                    "pedestal_average warming up ({}/{} events), outputs low-confidence",
                    self.events_seen, self.warmup_events
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationFile;
    use crate::channel_map::ChannelMap;
    use crate::event::{RawEventBlock, RawHit};
    use crate::tid::Tid;

    fn calib_yaml() -> &'static str {
        "
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
"
    }

    fn assembly_for(hits: Vec<RawHit>) -> EventAssembly {
        let mut block = RawEventBlock::new(Tid::new(7, 0));
        block.hits = hits;
        let map = ChannelMap::new(None).unwrap();
        EventAssembly::from_block(block, &map)
    }

    #[test]
    fn test_calibrated_hit() {
        let calib = CalibrationFile::from_yaml(calib_yaml()).unwrap();
        // raw channel 0 is cb element 0
        let mut assembly = assembly_for(vec![RawHit {
            channel: 0,
            values: vec![300, 600],
        }]);
        CalibrationHook::new().apply(&mut assembly, &calib);
        assert_eq!(assembly.cluster_hits.len(), 1);
        let hit = &assembly.cluster_hits[0];
        assert_eq!(hit.energy, 100.0);
        assert_eq!(hit.time, 10.0);
        assert!(hit.is_sane());
    }

    #[test]
    fn test_unmapped_channel_masked_but_counted() {
        let calib = CalibrationFile::from_yaml(calib_yaml()).unwrap();
        // channel 4095 does not exist in the map; 4095 is also a saturated
        // 12-bit ADC value
        let mut assembly = assembly_for(vec![RawHit {
            channel: 4095,
            values: vec![4095],
        }]);
        // mapping still yields a read hit
        assert_eq!(assembly.read_hits.len(), 1);
        assert_eq!(assembly.read_hits[0].detector, DetectorType::Unknown);

        CalibrationHook::new().apply(&mut assembly, &calib);
        assert!(assembly.cluster_hits.is_empty());
        let unresolved: Vec<_> = assembly
            .diagnostics
            .iter()
            .filter(|m| m.code == DiagnosticCode::UnresolvedCalibration)
            .collect();
        assert_eq!(unresolved.len(), 1);
    }

    #[test]
    fn test_missing_coefficients_masked() {
        let calib = CalibrationFile::from_yaml(calib_yaml()).unwrap();
        // channel 1 is cb element 1, which has no calibration entry
        let mut assembly = assembly_for(vec![RawHit {
            channel: 1,
            values: vec![300, 600],
        }]);
        CalibrationHook::new().apply(&mut assembly, &calib);
        assert!(assembly.cluster_hits.is_empty());
        assert!(assembly
            .diagnostics
            .iter()
            .any(|m| m.code == DiagnosticCode::UnresolvedCalibration));
    }

    #[test]
    fn test_pedestal_warmup_marks_events() {
        let calib = CalibrationFile::from_yaml(calib_yaml()).unwrap();
        let mut hook = PedestalAverageHook::new(2);
        for counter in 0..3 {
            let mut block = RawEventBlock::new(Tid::new(7, counter));
            block.hits = vec![RawHit {
                channel: 0,
                values: vec![100 + counter as u16, 600],
            }];
            let map = ChannelMap::new(None).unwrap();
            let mut assembly = EventAssembly::from_block(block, &map);
            hook.process(&mut assembly, &calib);
            let warm = assembly
                .diagnostics
                .iter()
                .any(|m| m.code == DiagnosticCode::HookWarmUp);
            assert_eq!(warm, counter < 2);
        }
        assert_eq!(hook.pedestal(0), Some(101.0));
    }
}
