//! JSON configuration and report helpers for the command-line dry run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use bed_calib_core::{AffineCorrection, ZJitter};
use bed_calib_probe::{RefineStrategy, SimBedConfig};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{CalibrationRun, ScanRun};
use crate::params::CalibrationParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Configuration of a simulated calibration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub params: CalibrationParams,
    /// The simulated printer.
    pub sim: SimBedConfig,
    pub strategy: RefineStrategy,
    /// Calibration record file; an in-memory record is used when absent.
    pub storage_path: Option<String>,
    pub output_path: Option<String>,
    pub verbosity: i8,
}

impl CalibrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("bed_calib_report.json"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub config_path: String,
    #[serde(default)]
    pub coarse: Option<CalibrationRun>,
    #[serde(default)]
    pub refine: Option<CalibrationRun>,
    #[serde(default)]
    pub scan: Option<ScanRun>,
    /// Correction installed at the end of the run.
    pub correction: AffineCorrection,
    #[serde(default)]
    pub z_jitter: Option<ZJitter>,
    /// Motion commands issued.
    pub moves: usize,
}

impl CalibrationReport {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_string_lossy().into_owned(),
            coarse: None,
            refine: None,
            scan: None,
            correction: AffineCorrection::IDENTITY,
            z_jitter: None,
            moves: 0,
        }
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
