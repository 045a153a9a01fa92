use std::path::Path;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::CalibrationError;
use super::event::DetectorType;
use super::tid::Tid;

/// Per-channel conversion factors from raw units to physical units.
///
/// Energy in MeV: `(raw - pedestal) * gain`. Time in ns:
/// `raw * time_gain + time_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub pedestal: f64,
    pub gain: f64,
    pub time_offset: f64,
    pub time_gain: f64,
}

impl Coefficients {
    pub fn energy(&self, raw: u16) -> f64 {
        (raw as f64 - self.pedestal) * self.gain
    }

    pub fn time(&self, raw: u16) -> f64 {
        raw as f64 * self.time_gain + self.time_offset
    }
}

/// Maps (detector, element, tid) to the coefficients valid at that trigger.
///
/// The provider is the seam to the calibration database. It must be safely
/// shareable for concurrent reads across pipeline instances; implementations
/// hand out immutable snapshots per validity window and never mutate them
/// while in use.
pub trait CalibrationProvider: Send + Sync {
    fn get(&self, detector: DetectorType, element: u32, tid: &Tid) -> Option<&Coefficients>;
}

/// Unique key for a detector element, in the style of the flat channel uuid.
fn element_uuid(detector: DetectorType, element: u32) -> u64 {
    (element as u64) + (detector.bit() as u64) * 1_000_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChannelEntry {
    detector: DetectorType,
    element: u32,
    #[serde(flatten)]
    coefficients: Coefficients,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WindowEntry {
    first_counter: u32,
    last_counter: u32,
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunEntry {
    run: u32,
    windows: Vec<WindowEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationDocument {
    runs: Vec<RunEntry>,
}

/// One immutable validity window, indexed for lookup.
#[derive(Debug)]
struct Window {
    first_counter: u32,
    last_counter: u32,
    channels: FxHashMap<u64, Coefficients>,
}

/// Calibration coefficients loaded from a YAML file of validity windows.
///
/// The file groups coefficients per run, and within a run per counter window.
/// The whole structure is immutable after load, so an `Arc<CalibrationFile>`
/// can back any number of concurrently running pipelines.
#[derive(Debug, Default)]
pub struct CalibrationFile {
    runs: FxHashMap<u32, Vec<Window>>,
}

impl CalibrationFile {
    /// Load a calibration file. A missing or unparsable file is fatal at
    /// startup; there is no degraded mode without calibration.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, CalibrationError> {
        let doc = serde_yaml::from_str::<CalibrationDocument>(yaml_str)?;
        let mut runs: FxHashMap<u32, Vec<Window>> = FxHashMap::default();
        for run in doc.runs {
            let windows = runs.entry(run.run).or_default();
            for w in run.windows {
                let mut channels = FxHashMap::default();
                for c in w.channels {
                    channels.insert(element_uuid(c.detector, c.element), c.coefficients);
                }
                windows.push(Window {
                    first_counter: w.first_counter,
                    last_counter: w.last_counter,
                    channels,
                });
            }
            windows.sort_by_key(|w| w.first_counter);
        }
        Ok(Self { runs })
    }
}

impl CalibrationProvider for CalibrationFile {
    fn get(&self, detector: DetectorType, element: u32, tid: &Tid) -> Option<&Coefficients> {
        let windows = self.runs.get(&tid.run)?;
        let window = windows
            .iter()
            .find(|w| w.first_counter <= tid.counter && tid.counter <= w.last_counter)?;
        window.channels.get(&element_uuid(detector, element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
runs:
  - run: 4
    windows:
      - first_counter: 0
        last_counter: 99
        channels:
          - detector: cb
            element: 3
            pedestal: 100.0
            gain: 0.5
            time_offset: -50.0
            time_gain: 0.1
      - first_counter: 100
        last_counter: 4294967295
        channels:
          - detector: cb
            element: 3
            pedestal: 110.0
            gain: 0.5
            time_offset: -50.0
            time_gain: 0.1
";

    #[test]
    fn test_window_selection() {
        let calib = CalibrationFile::from_yaml(YAML).unwrap();
        let early = calib
            .get(DetectorType::Cb, 3, &Tid::new(4, 10))
            .unwrap();
        assert_eq!(early.pedestal, 100.0);
        let late = calib
            .get(DetectorType::Cb, 3, &Tid::new(4, 100))
            .unwrap();
        assert_eq!(late.pedestal, 110.0);
        // unknown run, element outside the map
        assert!(calib.get(DetectorType::Cb, 3, &Tid::new(5, 10)).is_none());
        assert!(calib.get(DetectorType::Pid, 3, &Tid::new(4, 10)).is_none());
    }

    #[test]
    fn test_coefficient_application() {
        let c = Coefficients {
            pedestal: 100.0,
            gain: 0.5,
            time_offset: -50.0,
            time_gain: 0.1,
        };
        assert_eq!(c.energy(300), 100.0);
        assert_eq!(c.time(600), 10.0);
    }
}
