// SPDX-License-Identifier: GPL-3.0-only

//! Timelapse movie assembly
//!
//! Turns a run's staged frames into a single movie through an external
//! encoder. The movie is rendered to a hidden partial file and only renamed
//! into place once the encoder succeeds.

pub mod assembly;

pub use assembly::{EncodeJob, FfmpegEncoder, VideoEncoder, assemble};
