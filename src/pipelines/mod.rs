// SPDX-License-Identifier: GPL-3.0-only

//! Post-capture processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Staged JPEGs │ ──▶ │  Video assembly   │ ──▶ │   MP4 File   │
//! │ (one run)    │     │  - ffmpeg         │     │  (promoted   │
//! │              │     │  - temp render    │     │   on success)│
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! Assembly runs on its own task so capture is never held up by encoding.

pub mod video;
