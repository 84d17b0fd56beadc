// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Still capture resolutions the station accepts
///
/// The tags are the Raspberry Pi camera modes; anything else is rejected at
/// parse time and replaced with the default by the settings layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// 640x480
    #[serde(rename = "640x480")]
    Vga,
    /// 1280x720
    #[default]
    #[serde(rename = "1280x720")]
    Hd,
    /// 1640x1232 (2x2 binned full field of view)
    #[serde(rename = "1640x1232")]
    Binned,
    /// 1920x1080
    #[serde(rename = "1920x1080")]
    FullHd,
    /// 3280x2464 (full sensor)
    #[serde(rename = "3280x2464")]
    Full,
}

impl Resolution {
    /// All accepted resolutions, smallest first
    pub const ALL: [Resolution; 5] = [
        Resolution::Vga,
        Resolution::Hd,
        Resolution::Binned,
        Resolution::FullHd,
        Resolution::Full,
    ];

    /// Pixel dimensions (width, height)
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Vga => (640, 480),
            Resolution::Hd => (1280, 720),
            Resolution::Binned => (1640, 1232),
            Resolution::FullHd => (1920, 1080),
            Resolution::Full => (3280, 2464),
        }
    }

    /// Tag used in forms and configuration, e.g. "1280x720"
    pub fn tag(self) -> &'static str {
        match self {
            Resolution::Vga => "640x480",
            Resolution::Hd => "1280x720",
            Resolution::Binned => "1640x1232",
            Resolution::FullHd => "1920x1080",
            Resolution::Full => "3280x2464",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['×', ' '], "x");
        Resolution::ALL
            .into_iter()
            .find(|r| r.tag() == normalized)
            .ok_or_else(|| format!("unsupported resolution '{}'", s.trim()))
    }
}

/// Exposure values frozen after the initial convergence of a fixed-gain run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureLock {
    /// Shutter speed in microseconds
    pub shutter_us: u32,
    /// White balance gains (red, blue)
    pub awb_gains: (f32, f32),
}

impl std::fmt::Display for ExposureLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}us awb {:.3},{:.3}",
            self.shutter_us, self.awb_gains.0, self.awb_gains.1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse_accepts_tags() {
        for res in Resolution::ALL {
            assert_eq!(res.tag().parse::<Resolution>(), Ok(res));
        }
        assert_eq!(" 1920X1080 ".parse::<Resolution>(), Ok(Resolution::FullHd));
        assert_eq!("1280×720".parse::<Resolution>(), Ok(Resolution::Hd));
    }

    #[test]
    fn test_resolution_parse_rejects_unknown() {
        assert!("1024x768".parse::<Resolution>().is_err());
        assert!("".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_serializes_as_tag() {
        let json = serde_json::to_string(&Resolution::Binned).unwrap();
        assert_eq!(json, "\"1640x1232\"");
        let back: Resolution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Resolution::Binned);
    }
}
