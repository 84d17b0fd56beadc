// SPDX-License-Identifier: GPL-3.0-only

//! In-memory stand-ins for the station hardware

#![allow(dead_code)]

use nightowl::backends::camera::{
    CameraDevice, CameraResult, CameraSession, ExposureLock, Resolution,
};
use nightowl::errors::{CameraError, EncodeError};
use nightowl::illuminator::{Illuminator, OutputLine};
use nightowl::pipelines::video::{EncodeJob, VideoEncoder};
use nightowl::storage;
use nightowl::timelapse::{CameraSettings, CaptureTiming, TimelapseController};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CONVERGED: ExposureLock = ExposureLock {
    shutter_us: 33_000,
    awb_gains: (1.8, 1.4),
};

#[derive(Debug, Default)]
pub struct CameraLog {
    pub opens: usize,
    pub open_sessions: usize,
    pub resolutions: Vec<Resolution>,
    pub gains: Vec<u32>,
    pub convergences: usize,
    pub locks: Vec<ExposureLock>,
    pub captures: Vec<PathBuf>,
}

/// Records every call and writes a small file for each still
#[derive(Debug, Default)]
pub struct FakeCamera {
    log: Arc<Mutex<CameraLog>>,
    /// Captures fail once this many stills have been taken
    fail_after: Option<usize>,
    /// Time every capture blocks for
    capture_delay: Duration,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(captures: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(captures),
            ..Default::default()
        })
    }

    pub fn slow(capture_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            capture_delay,
            ..Default::default()
        })
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    pub fn open_sessions(&self) -> usize {
        self.log.lock().unwrap().open_sessions
    }

    pub fn captures(&self) -> Vec<PathBuf> {
        self.log.lock().unwrap().captures.clone()
    }

    pub fn convergences(&self) -> usize {
        self.log.lock().unwrap().convergences
    }

    pub fn gains(&self) -> Vec<u32> {
        self.log.lock().unwrap().gains.clone()
    }

    pub fn locks(&self) -> Vec<ExposureLock> {
        self.log.lock().unwrap().locks.clone()
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.log.lock().unwrap().resolutions.clone()
    }
}

impl CameraDevice for FakeCamera {
    fn open(&self, resolution: Resolution) -> CameraResult<Box<dyn CameraSession>> {
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        log.open_sessions += 1;
        log.resolutions.push(resolution);
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            fail_after: self.fail_after,
            capture_delay: self.capture_delay,
        }))
    }
}

struct FakeSession {
    log: Arc<Mutex<CameraLog>>,
    fail_after: Option<usize>,
    capture_delay: Duration,
}

impl CameraSession for FakeSession {
    fn set_gain(&mut self, iso: u32) -> CameraResult<()> {
        self.log.lock().unwrap().gains.push(iso);
        Ok(())
    }

    fn await_exposure_convergence(&mut self, _settle: Duration) -> CameraResult<ExposureLock> {
        self.log.lock().unwrap().convergences += 1;
        Ok(CONVERGED)
    }

    fn lock_exposure(&mut self, lock: &ExposureLock) -> CameraResult<()> {
        self.log.lock().unwrap().locks.push(*lock);
        Ok(())
    }

    fn capture_frame(&mut self, destination: &Path) -> CameraResult<()> {
        std::thread::sleep(self.capture_delay);
        let mut log = self.log.lock().unwrap();
        if self.fail_after.is_some_and(|n| log.captures.len() >= n) {
            return Err(CameraError::CaptureFailed("sensor timeout".to_string()));
        }
        std::fs::write(destination, b"jpeg")
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        log.captures.push(destination.to_path_buf());
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.log.lock().unwrap().open_sessions -= 1;
    }
}

/// A finished encode: the job and how many frames of the run were staged
#[derive(Debug, Clone)]
pub struct EncodeRecord {
    pub job: EncodeJob,
    pub staged_frames: usize,
}

/// Writes a placeholder movie to the partial output
#[derive(Debug, Default)]
pub struct FakeEncoder {
    records: Mutex<Vec<EncodeRecord>>,
    delay: Duration,
    fail: bool,
}

impl FakeEncoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn records(&self) -> Vec<EncodeRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl VideoEncoder for FakeEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        self.records.lock().unwrap().push(EncodeRecord {
            job: job.clone(),
            staged_frames: storage::count_frames(&job.staging_dir, &job.run_id),
        });
        std::thread::sleep(self.delay);
        std::fs::write(&job.partial_output, b"mp4").map_err(EncodeError::Promote)?;
        if self.fail {
            return Err(EncodeError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "No such file or directory".to_string(),
            });
        }
        Ok(())
    }
}

struct MemoryLine {
    line: u32,
    level: Arc<AtomicBool>,
}

impl OutputLine for MemoryLine {
    fn line(&self) -> u32 {
        self.line
    }

    fn set(&mut self, high: bool) -> io::Result<()> {
        self.level.store(high, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self) -> io::Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Illuminator on two in-memory lines, plus handles to their levels
pub fn memory_illuminator() -> (Arc<Illuminator>, Vec<Arc<AtomicBool>>) {
    let levels: Vec<_> = (0..2).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let lines = levels
        .iter()
        .zip([27, 22])
        .map(|(level, line)| {
            Box::new(MemoryLine {
                line,
                level: Arc::clone(level),
            }) as Box<dyn OutputLine>
        })
        .collect();
    (Arc::new(Illuminator::new(lines).unwrap()), levels)
}

pub fn levels(lines: &[Arc<AtomicBool>]) -> Vec<bool> {
    lines.iter().map(|l| l.load(Ordering::SeqCst)).collect()
}

pub fn settings(root: &Path) -> CameraSettings {
    CameraSettings {
        resolution: Resolution::Hd,
        gain: 0,
        illuminator: false,
        staging_dir: root.join("staging"),
        output_dir: root.join("movies"),
    }
}

pub fn fast_timing() -> CaptureTiming {
    CaptureTiming {
        exposure_settle: Duration::ZERO,
        illuminator_warmup: Duration::ZERO,
        start_poll: Duration::from_millis(20),
    }
}

pub fn controller(
    camera: Arc<FakeCamera>,
    encoder: Arc<FakeEncoder>,
    illuminator: Option<Arc<Illuminator>>,
    settings: CameraSettings,
) -> TimelapseController {
    TimelapseController::new(camera, encoder, illuminator, settings, fast_timing())
}

/// Poll `condition` for up to five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5 s");
}
