use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DetectorError;
use super::message::UnpackerMessage;
use super::tid::Tid;

/// The detector subsystems of the experiment.
///
/// `Unknown` labels hits whose raw channel has no channel map entry; such
/// hits are carried through the pipeline (never silently dropped) but are
/// masked from calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorType {
    /// Crystal Ball calorimeter.
    Cb,
    /// Particle identification detector, the charged-particle veto of CB.
    Pid,
    /// Forward-wall calorimeter.
    Taps,
    /// Veto wall in front of TAPS.
    TapsVeto,
    Unknown,
}

impl DetectorType {
    /// Flat bit index of the subsystem, used for masks and element uuids.
    pub fn bit(&self) -> u8 {
        match self {
            DetectorType::Cb => 0,
            DetectorType::Pid => 1,
            DetectorType::Taps => 2,
            DetectorType::TapsVeto => 3,
            DetectorType::Unknown => 7,
        }
    }

    pub fn is_calorimeter(&self) -> bool {
        matches!(self, DetectorType::Cb | DetectorType::Taps)
    }

    /// The charged-particle veto detector paired with this calorimeter.
    pub fn veto_partner(&self) -> Option<DetectorType> {
        match self {
            DetectorType::Cb => Some(DetectorType::Pid),
            DetectorType::Taps => Some(DetectorType::TapsVeto),
            _ => None,
        }
    }
}

impl FromStr for DetectorType {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cb" => Ok(DetectorType::Cb),
            "pid" => Ok(DetectorType::Pid),
            "taps" => Ok(DetectorType::Taps),
            "taps_veto" => Ok(DetectorType::TapsVeto),
            _ => Err(DetectorError::InvalidKeyword(s.to_string())),
        }
    }
}

impl Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorType::Cb => write!(f, "CB"),
            DetectorType::Pid => write!(f, "PID"),
            DetectorType::Taps => write!(f, "TAPS"),
            DetectorType::TapsVeto => write!(f, "TAPSVeto"),
            DetectorType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The set of subsystems contributing to a candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorMask(u8);

impl DetectorMask {
    pub fn with(self, detector: DetectorType) -> Self {
        Self(self.0 | (1 << detector.bit()))
    }

    pub fn has(&self, detector: DetectorType) -> bool {
        self.0 & (1 << detector.bit()) != 0
    }
}

/// One reassembled raw hit: a flat DAQ channel and its raw values, in the
/// module's declared word order (e.g. ADC word then TDC word).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    pub channel: u16,
    pub values: Vec<u16>,
}

/// A raw hit mapped onto its detector element.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorReadHit {
    pub channel: u16,
    pub detector: DetectorType,
    pub element: u32,
    /// Element position in the detector frame, cm.
    pub position: [f64; 3],
    pub values: Vec<u16>,
}

/// A calibrated hit: energy in MeV, time in ns.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterHit {
    pub detector: DetectorType,
    pub element: u32,
    pub channel: u16,
    pub position: [f64; 3],
    pub energy: f64,
    pub time: f64,
    /// Set while an upstream stateful hook is still warming up.
    pub low_confidence: bool,
}

impl ClusterHit {
    /// A hit usable for clustering: positive finite energy, finite time.
    pub fn is_sane(&self) -> bool {
        self.energy.is_finite() && self.energy > 0.0 && self.time.is_finite()
    }
}

/// A group of adjacent calibrated hits in one detector, interpreted as one
/// particle's energy deposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub detector: DetectorType,
    /// Summed energy of the members, MeV.
    pub energy: f64,
    /// Central (seed) time, ns.
    pub time: f64,
    /// Energy-weighted centroid position, cm.
    pub position: [f64; 3],
    /// Element index of the seed, the most energetic member.
    pub central_element: u32,
    /// Members sorted by element index.
    pub hits: Vec<ClusterHit>,
}

impl Cluster {
    /// Polar angle of the centroid as seen from the target, rad.
    pub fn theta(&self) -> f64 {
        let [x, y, z] = self.position;
        let r = (x * x + y * y + z * z).sqrt();
        if r > 0.0 {
            (z / r).acos()
        } else {
            0.0
        }
    }

    /// Azimuthal angle of the centroid, rad in (-pi, pi].
    pub fn phi(&self) -> f64 {
        self.position[1].atan2(self.position[0])
    }
}

/// A particle candidate built from matched clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub detectors: DetectorMask,
    /// Calorimeter energy, MeV.
    pub energy: f64,
    pub theta: f64,
    pub phi: f64,
    pub time: f64,
    /// Number of hits in the calorimeter cluster.
    pub cluster_size: usize,
    /// Energy of the matched veto cluster; `None` means no veto matched,
    /// i.e. the deposition looks neutral.
    pub veto_energy: Option<f64>,
}

/// One scaler read, a slow-control value sampled by the DAQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlowControl {
    pub tid: Tid,
    pub index: u32,
    pub value: u32,
}

/// A hardware error reported by a DAQ module inside the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaqError {
    pub module_id: u32,
    pub module_index: u32,
    pub error_code: u32,
}

/// The uniform output of every unpacker variant: one decoded event block,
/// before channel mapping and calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEventBlock {
    /// `None` only for blocks that could not be attributed to a trigger.
    pub tid: Option<Tid>,
    pub hits: Vec<RawHit>,
    pub slow_controls: Vec<SlowControl>,
    pub daq_errors: Vec<DaqError>,
    pub messages: Vec<UnpackerMessage>,
}

impl RawEventBlock {
    pub fn new(tid: Tid) -> Self {
        Self {
            tid: Some(tid),
            hits: Vec::new(),
            slow_controls: Vec::new(),
            daq_errors: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// The immutable per-trigger event record, the final product of the
/// reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub tid: Tid,
    pub candidates: Vec<Candidate>,
    /// Clusters not promoted to a candidate (veto-only depositions).
    pub unmatched_clusters: Vec<Cluster>,
    pub slow_controls: Vec<SlowControl>,
    pub daq_errors: Vec<DaqError>,
    pub diagnostics: Vec<UnpackerMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_keywords() {
        assert_eq!(DetectorType::from_str("cb").unwrap(), DetectorType::Cb);
        assert_eq!(
            DetectorType::from_str("taps_veto").unwrap(),
            DetectorType::TapsVeto
        );
        assert!(DetectorType::from_str("mwpc").is_err());
    }

    #[test]
    fn test_veto_partners() {
        assert_eq!(DetectorType::Cb.veto_partner(), Some(DetectorType::Pid));
        assert_eq!(
            DetectorType::Taps.veto_partner(),
            Some(DetectorType::TapsVeto)
        );
        assert_eq!(DetectorType::Pid.veto_partner(), None);
        assert!(!DetectorType::Pid.is_calorimeter());
        assert!(DetectorType::Taps.is_calorimeter());
    }

    #[test]
    fn test_detector_mask() {
        let mask = DetectorMask::default()
            .with(DetectorType::Cb)
            .with(DetectorType::Pid);
        assert!(mask.has(DetectorType::Cb));
        assert!(mask.has(DetectorType::Pid));
        assert!(!mask.has(DetectorType::Taps));
    }

    #[test]
    fn test_cluster_angles() {
        let cluster = Cluster {
            detector: DetectorType::Cb,
            energy: 100.0,
            time: 10.0,
            position: [0.0, 30.0, 0.0],
            central_element: 0,
            hits: Vec::new(),
        };
        assert!((cluster.theta() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((cluster.phi() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_hit_sanity() {
        let mut hit = ClusterHit {
            detector: DetectorType::Cb,
            element: 0,
            channel: 0,
            position: [30.0, 0.0, 0.0],
            energy: 50.0,
            time: 10.0,
            low_confidence: false,
        };
        assert!(hit.is_sane());
        hit.time = f64::NAN;
        assert!(!hit.is_sane());
        hit.time = 10.0;
        hit.energy = -1.0;
        assert!(!hit.is_sane());
    }
}
