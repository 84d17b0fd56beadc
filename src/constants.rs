// SPDX-License-Identifier: GPL-3.0-only

//! Station-wide constants

use std::time::Duration;

/// Framerate of the rendered timelapse movie
///
/// Together with the acceleration factor this fixes the inter-frame delay:
/// `delay = acceleration / MOVIE_FRAMERATE` seconds.
pub const MOVIE_FRAMERATE: u32 = 24;

/// Schedule defaults and limits
pub mod schedule {
    /// Default run duration in hours
    pub const DEFAULT_DURATION_HOURS: f64 = 1.0;

    /// Longest accepted run in hours; anything above falls back to the default
    pub const MAX_DURATION_HOURS: f64 = 24.0;

    /// Default acceleration factor (240 → one frame every 10 s at 24 fps)
    pub const DEFAULT_ACCELERATION: f64 = 240.0;
}

/// Capture timing
pub mod timing {
    use super::Duration;

    /// Inter-frame delays at or above this use the discrete strategy
    pub const DISCRETE_STRATEGY_THRESHOLD: Duration = Duration::from_secs(120);

    /// Poll granularity while waiting for the scheduled start
    pub const START_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Time given to auto exposure / white balance before locking
    pub const EXPOSURE_SETTLE: Duration = Duration::from_secs(2);

    /// Time the IR illuminator needs to reach full output
    pub const ILLUMINATOR_WARMUP: Duration = Duration::from_secs(1);
}

/// Staging and output file naming
pub mod files {
    /// Prefix of per-run frame files and finished movies
    pub const TIMELAPSE_PREFIX: &str = "timelapse";

    /// Prefix of single preview stills
    pub const PREVIEW_PREFIX: &str = "preview";

    /// Still image extension
    pub const FRAME_EXTENSION: &str = "jpg";

    /// Movie container extension
    pub const MOVIE_EXTENSION: &str = "mp4";

    /// Width of the zero-padded frame counter; a 24 h run at the smallest
    /// accepted acceleration stays below 10^7 stills
    pub const FRAME_COUNTER_WIDTH: usize = 7;

    /// Run identifier format, derived from the run's start time
    pub const RUN_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
}

/// Hardware defaults for a stock Raspberry Pi build
pub mod hardware {
    /// IR illuminator lines (BCM numbering; board pins 13 and 15)
    pub const ILLUMINATOR_LINES: [u32; 2] = [27, 22];

    /// I2C bus the AHT20 sensor is attached to
    pub const I2C_BUS: u8 = 1;

    /// AHT20 I2C address
    pub const AHT20_ADDRESS: u16 = 0x38;

    /// Still capture command (libcamera apps)
    pub const CAMERA_COMMAND: &str = "rpicam-still";

    /// Encoder command
    pub const ENCODER_COMMAND: &str = "ffmpeg";
}

/// Application version string, stamped by the build script
pub fn app_version() -> &'static str {
    env!("GIT_VERSION")
}
