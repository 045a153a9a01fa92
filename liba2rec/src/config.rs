use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Tuning knobs of the built-in reconstruction hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionParams {
    /// Clustering timing window around the cluster's central time, ns.
    pub cluster_time_window: f64,
    /// Spatial adjacency radius for clustering, cm.
    pub neighbour_radius: f64,
    /// Azimuthal window for calorimeter/veto matching, rad.
    pub phi_epsilon: f64,
    /// Events the pedestal averaging hook needs before its estimate is
    /// trusted; 0 disables the hook.
    pub pedestal_warmup_events: u32,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            cluster_time_window: 15.0,
            neighbour_radius: 7.0,
            phi_epsilon: 0.25,
            pedestal_warmup_events: 0,
        }
    }
}

/// Structure representing the application configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub raw_path: PathBuf,
    pub calibration_path: PathBuf,
    pub channel_map_path: Option<PathBuf>,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub n_threads: i32,
    #[serde(default)]
    pub reconstruction: ReconstructionParams,
}

impl Default for Config {
    /// Generate a new Config object. All fields will be empty/invalid
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from("None"),
            calibration_path: PathBuf::from("None"),
            channel_map_path: None,
            first_run_number: 0,
            last_run_number: 0,
            n_threads: 1,
            reconstruction: ReconstructionParams::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check if a specific run exists by evaluating the existance of its raw file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_raw_file_name(run_number).exists()
    }

    /// Get the path to the raw data file of a run
    pub fn get_raw_file_name(&self, run_number: i32) -> PathBuf {
        self.raw_path.join(format!("{}.dat", self.get_run_str(run_number)))
    }

    /// Construct the run string using the DAQ file naming convention
    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number:0>4}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
