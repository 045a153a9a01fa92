// Maps flat raw DAQ channel numbers to detector elements. The raw channel
// space is whatever the DAQ module table says it is; the detector side is
// (subsystem, element index, element position). The mapping changes between
// beamtimes, so it is read from a CSV file; a default matching the standard
// setup is bundled with the library.
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use fxhash::FxHashMap;

use super::error::ChannelMapError;
use super::event::DetectorType;

const ENTRIES_PER_LINE: usize = 6; // raw_channel,detector,element,x,y,z

/// Load the default map for windows
#[cfg(target_family = "windows")]
fn load_default_map() -> String {
    String::from(include_str!("data\\default_channel_map.csv"))
}

/// Load the default map for macos and linux
#[cfg(target_family = "unix")]
fn load_default_map() -> String {
    String::from(include_str!("data/default_channel_map.csv"))
}

/// The detector-side identity of one raw channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelId {
    pub detector: DetectorType,
    pub element: u32,
    pub position: [f64; 3],
}

/// ChannelMap contains the mapping of raw DAQ channel numbers to detector
/// elements and their positions.
///
/// The map is a pure function: the same raw channel always yields the same
/// element. Channels absent from the map are not an error here; unmapped
/// hits are flagged downstream and suppressed from calibration.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    map: FxHashMap<u16, ChannelId>,
}

impl ChannelMap {
    /// Create a new ChannelMap.
    /// If the path is None, we load the default that is bundled with the library.
    pub fn new(path: Option<&Path>) -> Result<Self, ChannelMapError> {
        let mut contents = String::new();
        if let Some(p) = path {
            let mut file = File::open(p)?;
            file.read_to_string(&mut contents)?;
        } else {
            contents = load_default_map();
        }

        let mut cm = ChannelMap::default();

        let mut lines = contents.lines();
        lines.next(); // Skip the header
        for line in lines {
            let entries: Vec<&str> = line.split_terminator(',').collect();
            if entries.len() != ENTRIES_PER_LINE {
                return Err(ChannelMapError::BadFileFormat);
            }

            let raw_channel: u16 = entries[0].parse()?;
            let detector = DetectorType::from_str(entries[1])?;
            let element: u32 = entries[2].parse()?;
            let position = [
                entries[3].parse::<f64>()?,
                entries[4].parse::<f64>()?,
                entries[5].parse::<f64>()?,
            ];

            cm.map.insert(
                raw_channel,
                ChannelId {
                    detector,
                    element,
                    position,
                },
            );
        }

        Ok(cm)
    }

    /// Look up the detector element for a raw channel.
    ///
    /// Returns None if the channel does not exist in the map.
    pub fn get(&self, raw_channel: u16) -> Option<&ChannelId> {
        self.map.get(&raw_channel)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map() {
        let map = match ChannelMap::new(None) {
            Ok(m) => m,
            Err(_) => {
                panic!();
            }
        };
        // channel 0 is the first CB crystal on the ring
        let id = match map.get(0) {
            Some(id) => id,
            None => panic!(),
        };
        assert_eq!(id.detector, DetectorType::Cb);
        assert_eq!(id.element, 0);
        assert_eq!(id.position[2], 0.0);
        // channel 32 is the first PID paddle
        let id = map.get(32).unwrap();
        assert_eq!(id.detector, DetectorType::Pid);
        assert_eq!(id.element, 0);
    }

    #[test]
    fn test_mapping_is_pure() {
        let map = ChannelMap::new(None).unwrap();
        let first = map.get(17).unwrap().clone();
        for _ in 0..3 {
            assert_eq!(map.get(17), Some(&first));
        }
    }

    #[test]
    fn test_unmapped_channel_is_none() {
        let map = ChannelMap::new(None).unwrap();
        assert!(map.get(4095).is_none());
    }

    #[test]
    fn test_wrong_column_count_is_rejected() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_map.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "raw_channel,detector,element,x,y,z").unwrap();
        writeln!(file, "0,cb,0,30.0,0.0").unwrap();
        assert!(matches!(
            ChannelMap::new(Some(&path)),
            Err(ChannelMapError::BadFileFormat)
        ));
    }
}
