// SPDX-License-Identifier: GPL-3.0-only

//! Station configuration
//!
//! Stored as JSON at `<config_dir>/nightowl/config.json`. A missing or broken
//! file never prevents the station from starting; defaults are used instead.

use crate::backends::camera::Resolution;
use crate::constants::hardware;
use crate::constants::timing::{EXPOSURE_SETTLE, ILLUMINATOR_WARMUP, START_POLL_INTERVAL};
use crate::errors::{AppError, AppResult};
use crate::timelapse::{CameraSettings, CaptureTiming};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const APP_DIR: &str = "nightowl";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scratch directory for stills
    pub staging_dir: PathBuf,
    /// Directory finished movies are written to
    pub output_dir: PathBuf,
    /// GPIO lines (BCM numbering) driving the IR illuminator
    pub illuminator_lines: Vec<u32>,
    /// Still capture tool
    pub camera_command: String,
    /// Movie encoder tool
    pub encoder_command: String,
    /// Resolution used until the operator picks another one
    pub resolution: Resolution,
    /// Default gain, 0 for auto exposure
    pub gain: u32,
    /// Use the illuminator during runs by default
    pub illuminator: bool,
    /// Metering time before exposure is frozen, in milliseconds
    pub exposure_settle_ms: u64,
    /// Illuminator warm-up before capturing, in milliseconds
    pub illuminator_warmup_ms: u64,
    /// I2C bus of the temperature/humidity sensor
    pub i2c_bus: u8,
    /// I2C address of the temperature/humidity sensor
    pub sensor_address: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            output_dir: default_output_dir(),
            illuminator_lines: hardware::ILLUMINATOR_LINES.to_vec(),
            camera_command: hardware::CAMERA_COMMAND.to_string(),
            encoder_command: hardware::ENCODER_COMMAND.to_string(),
            resolution: Resolution::default(),
            gain: 0,
            illuminator: false,
            exposure_settle_ms: EXPOSURE_SETTLE.as_millis() as u64,
            illuminator_warmup_ms: ILLUMINATOR_WARMUP.as_millis() as u64,
            i2c_bus: hardware::I2C_BUS,
            sensor_address: hardware::AHT20_ADDRESS,
        }
    }
}

impl Config {
    /// Location of the configuration file, if the platform has a config dir
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No configuration directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read configuration, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::config_path()
            .ok_or_else(|| AppError::Config("no configuration directory".to_string()))?;
        self.save_to(&path)
    }

    /// Write as pretty JSON to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("serialize: {e}")))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Initial camera settings for the controller
    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            resolution: self.resolution,
            gain: self.gain.min(crate::timelapse::settings::MAX_ISO),
            illuminator: self.illuminator,
            staging_dir: self.staging_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }

    /// Hardware timing for the controller
    pub fn timing(&self) -> CaptureTiming {
        CaptureTiming {
            exposure_settle: Duration::from_millis(self.exposure_settle_ms),
            illuminator_warmup: Duration::from_millis(self.illuminator_warmup_ms),
            start_poll: START_POLL_INTERVAL,
        }
    }
}

fn default_staging_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("staging")
}

fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR)
}
