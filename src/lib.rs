// SPDX-License-Identifier: GPL-3.0-only

//! Nightowl - a nocturnal wildlife monitoring station
//!
//! This library provides the core of the station: scheduled infrared
//! timelapse capture on a Raspberry Pi camera and rendering of each run into
//! a movie.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`timelapse`]: Schedule model, capture strategies and the job controller
//! - [`backends`]: Camera backend abstraction (`rpicam-still`)
//! - [`pipelines`]: Video assembly through an external encoder
//! - [`illuminator`]: IR illuminator on GPIO output lines
//! - [`sensor`]: AHT20 temperature/humidity sensor
//! - [`config`]: Station configuration
//! - [`storage`]: Staging and output file management
//!
//! # Example
//!
//! ```ignore
//! let controller = TimelapseController::new(camera, encoder, None, settings, CaptureTiming::default());
//! controller.set_interval(Some("21:30"), Some(6.0), Some(480.0))?;
//! let run = controller.start()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod illuminator;
pub mod pipelines;
pub mod sensor;
pub mod storage;
pub mod timelapse;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult, ControllerError};
pub use timelapse::{
    CameraSettings, CaptureStrategy, CaptureTiming, JobStatus, Phase, RunHandle, RunReport,
    ScheduleInterval, TimelapseController,
};
