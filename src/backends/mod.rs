// SPDX-License-Identifier: GPL-3.0-only

//! Hardware backend layer
//!
//! The timelapse core only talks to the camera through the traits in
//! [`camera`]; concrete implementations live below it:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Timelapse controller             │
//! └────────────────────┬────────────────────────┘
//!                      │ CameraDevice / CameraSession
//! ┌────────────────────┴────────────────────────┐
//! │  ┌──────────────────────────────────────┐   │
//! │  │  rpicam (libcamera still capture)    │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
