// SPDX-License-Identifier: GPL-3.0-only

//! Camera settings for timelapse runs and previews

use crate::backends::camera::Resolution;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Highest sensitivity the Pi camera modules accept
pub const MAX_ISO: u32 = 1600;

/// Camera configuration, replaced wholesale on reconfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Still resolution
    pub resolution: Resolution,
    /// ISO-equivalent sensitivity; 0 keeps auto exposure
    pub gain: u32,
    /// Switch the IR illuminator on while capturing
    pub illuminator: bool,
    /// Scratch directory for stills
    pub staging_dir: PathBuf,
    /// Directory for finished movies
    pub output_dir: PathBuf,
}

impl CameraSettings {
    /// Build settings from raw form input, falling back to defaults for
    /// unknown resolutions and out-of-range gains
    pub fn from_request(
        resolution: Option<&str>,
        gain: Option<i64>,
        illuminator: bool,
        staging_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let resolution = match resolution.map(str::parse::<Resolution>) {
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                warn!(error = %e, default = %Resolution::default(), "Using default resolution");
                Resolution::default()
            }
            None => Resolution::default(),
        };

        let gain = match gain.unwrap_or(0) {
            g if g < 0 => {
                warn!(gain = g, "Negative gain, using auto exposure");
                0
            }
            g if g > i64::from(MAX_ISO) => {
                warn!(gain = g, max = MAX_ISO, "Gain too high, clamping");
                MAX_ISO
            }
            g => g as u32,
        };

        Self {
            resolution,
            gain,
            illuminator,
            staging_dir,
            output_dir,
        }
    }

    /// Whether exposure is frozen after the first frame of a run
    pub fn fixed_exposure(&self) -> bool {
        self.gain > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(resolution: Option<&str>, gain: Option<i64>) -> CameraSettings {
        CameraSettings::from_request(
            resolution,
            gain,
            false,
            PathBuf::from("staging"),
            PathBuf::from("out"),
        )
    }

    #[test]
    fn test_unknown_resolution_uses_default() {
        assert_eq!(request(Some("800x600"), None).resolution, Resolution::Hd);
        assert_eq!(request(Some("1920x1080"), None).resolution, Resolution::FullHd);
        assert_eq!(request(None, None).resolution, Resolution::Hd);
    }

    #[test]
    fn test_gain_bounds() {
        assert_eq!(request(None, Some(-5)).gain, 0);
        assert_eq!(request(None, Some(400)).gain, 400);
        assert_eq!(request(None, Some(10_000)).gain, MAX_ISO);
        assert!(!request(None, None).fixed_exposure());
        assert!(request(None, Some(200)).fixed_exposure());
    }
}
