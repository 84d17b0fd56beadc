// SPDX-License-Identifier: GPL-3.0-only

//! Job state shared between request handlers and the capture worker

use super::schedule::ScheduleInterval;
use super::settings::CameraSettings;
use super::strategy::CaptureStrategy;
use crate::backends::camera::ExposureLock;
use serde::{Deserialize, Serialize};

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// No run active
    #[default]
    Idle,
    /// Run accepted, waiting for the scheduled start
    WaitingForStart,
    /// Capturing stills
    Capturing,
    /// Capture finished, movie still being assembled
    Encoding,
    /// Capture loop exited, resources being released
    Stopped,
}

impl Phase {
    /// Display name for the dashboard
    pub fn display_name(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::WaitingForStart => "Waiting for start",
            Phase::Capturing => "Capturing",
            Phase::Encoding => "Encoding",
            Phase::Stopped => "Stopped",
        }
    }
}

/// Mutable controller state; always accessed under the controller lock
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Capture phase (never `Encoding`, which is derived)
    pub phase: Phase,
    /// A run is active (waiting or capturing)
    pub running: bool,
    /// A preview capture holds the camera
    pub previewing: bool,
    /// Runs whose movie is queued or being assembled
    pub pending_encodes: Vec<String>,
    /// Identifier of the current or most recent run
    pub run_id: Option<String>,
    /// Strategy of the current or most recent run
    pub strategy: Option<CaptureStrategy>,
    /// Exposure frozen for the current run
    pub exposure_lock: Option<ExposureLock>,
    /// Stills captured by the current or most recent run
    pub frames_captured: u64,
    /// Most recent failure, cleared when a new run starts
    pub last_error: Option<String>,
}

impl JobState {
    /// A movie is queued or being assembled
    pub fn encoding(&self) -> bool {
        !self.pending_encodes.is_empty()
    }

    /// Overall busy status: capturing or encoding
    pub fn is_active(&self) -> bool {
        self.running || self.encoding()
    }

    /// Phase as reported to clients
    pub fn reported_phase(&self) -> Phase {
        match self.phase {
            Phase::Idle | Phase::Stopped if self.encoding() => Phase::Encoding,
            phase => phase,
        }
    }

    /// Reset per-run fields for a new run
    pub(crate) fn begin_run(&mut self, run_id: String) {
        self.phase = Phase::WaitingForStart;
        self.running = true;
        self.run_id = Some(run_id);
        self.strategy = None;
        self.exposure_lock = None;
        self.frames_captured = 0;
        self.last_error = None;
    }
}

/// Point-in-time view of the controller for the web layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub phase: Phase,
    pub running: bool,
    pub encoding: bool,
    /// A preview capture holds the camera
    pub previewing: bool,
    pub run_id: Option<String>,
    pub strategy: Option<CaptureStrategy>,
    pub frames_captured: u64,
    pub exposure_lock: Option<ExposureLock>,
    pub last_error: Option<String>,
    pub interval: ScheduleInterval,
    pub settings: CameraSettings,
}

impl JobStatus {
    pub(crate) fn new(job: &JobState, interval: ScheduleInterval, settings: CameraSettings) -> Self {
        Self {
            phase: job.reported_phase(),
            running: job.running,
            encoding: job.encoding(),
            previewing: job.previewing,
            run_id: job.run_id.clone(),
            strategy: job.strategy,
            frames_captured: job.frames_captured,
            exposure_lock: job.exposure_lock,
            last_error: job.last_error.clone(),
            interval,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_running_or_encoding() {
        let mut job = JobState::default();
        assert!(!job.is_active());

        job.begin_run("r1".to_string());
        assert!(job.is_active());
        assert_eq!(job.reported_phase(), Phase::WaitingForStart);

        job.running = false;
        job.phase = Phase::Idle;
        job.pending_encodes.push("r1".to_string());
        assert!(job.is_active());
        assert_eq!(job.reported_phase(), Phase::Encoding);

        job.pending_encodes.clear();
        assert!(!job.is_active());
        assert_eq!(job.reported_phase(), Phase::Idle);
    }

    #[test]
    fn test_begin_run_clears_exposure_lock() {
        let mut job = JobState {
            exposure_lock: Some(ExposureLock {
                shutter_us: 1000,
                awb_gains: (1.0, 1.0),
            }),
            frames_captured: 12,
            last_error: Some("old".to_string()),
            ..Default::default()
        };
        job.begin_run("r2".to_string());
        assert!(job.exposure_lock.is_none());
        assert_eq!(job.frames_captured, 0);
        assert!(job.last_error.is_none());
    }
}
