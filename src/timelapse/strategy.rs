// SPDX-License-Identifier: GPL-3.0-only

//! Capture strategies
//!
//! Sparse timelapses open and close the camera for every still so the sensor
//! is idle (and cool) between frames; dense ones keep a single session open
//! and capture from it on a fixed cadence. Both follow the same contract:
//!
//! 1. **Setup**: warm up the illuminator and open the camera; with a gain
//!    requested, exposure is metered once and frozen
//! 2. **Per frame**: stop or deadline check, then capture and wait
//! 3. **Teardown**: camera and illuminator are released by drop on every exit

use super::CaptureTiming;
use super::schedule::ScheduleInterval;
use super::settings::CameraSettings;
use crate::backends::camera::{CameraDevice, CameraResult, CameraSession, ExposureLock, prepare_exposure};
use crate::constants::timing::DISCRETE_STRATEGY_THRESHOLD;
use crate::errors::{ControllerError, IlluminatorError};
use crate::illuminator::{Illuminator, IlluminatorGuard};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// How stills are taken during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureStrategy {
    /// Open and close the camera for every still
    Discrete,
    /// Keep the camera open and capture on a fixed cadence
    Continuous,
}

impl CaptureStrategy {
    /// Pick the strategy for an inter-frame delay; 120 s and above is discrete
    pub fn select(frame_delay: Duration) -> Self {
        if frame_delay >= DISCRETE_STRATEGY_THRESHOLD {
            CaptureStrategy::Discrete
        } else {
            CaptureStrategy::Continuous
        }
    }

    /// Strategy for a schedule
    pub fn for_interval(interval: &ScheduleInterval) -> Self {
        Self::select(interval.frame_delay())
    }

    /// Display name for the dashboard
    pub fn display_name(self) -> &'static str {
        match self {
            CaptureStrategy::Discrete => "Discrete",
            CaptureStrategy::Continuous => "Continuous",
        }
    }

    /// Capture until the schedule's duration has elapsed or a stop is requested
    pub(crate) async fn run(self, ctx: &mut RunContext) -> Result<(), ControllerError> {
        info!(
            run_id = %ctx.run_id,
            strategy = self.display_name(),
            delay_secs = ctx.interval.frame_delay().as_secs_f64(),
            resolution = %ctx.settings.resolution,
            gain = ctx.settings.gain,
            fixed_exposure = ctx.settings.fixed_exposure(),
            "Capture started"
        );
        match self {
            CaptureStrategy::Discrete => run_discrete(ctx).await,
            CaptureStrategy::Continuous => run_continuous(ctx).await,
        }
    }
}

/// Called after every stored still with the frame count and exposure lock
pub(crate) type FrameCallback = Box<dyn FnMut(u64, Option<ExposureLock>) + Send>;

/// Everything a capture loop needs for one run
pub(crate) struct RunContext {
    pub(crate) run_id: String,
    pub(crate) interval: ScheduleInterval,
    pub(crate) settings: CameraSettings,
    pub(crate) camera: Arc<dyn CameraDevice>,
    pub(crate) illuminator: Option<Arc<Illuminator>>,
    pub(crate) timing: CaptureTiming,
    pub(crate) cancel: watch::Receiver<bool>,
    pub(crate) frames: u64,
    pub(crate) exposure_lock: Option<ExposureLock>,
    pub(crate) on_frame: FrameCallback,
}

impl RunContext {
    pub(crate) fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sleep until `until`; `false` means stop was requested meanwhile
    pub(crate) async fn pause(&mut self, until: Instant) -> bool {
        if self.cancelled() {
            return false;
        }
        let mut cancel = self.cancel.clone();
        let stopped = tokio::select! {
            _ = tokio::time::sleep_until(until) => false,
            // a closed channel also means stop
            _ = cancel.wait_for(|stop| *stop) => true,
        };
        !stopped && !self.cancelled()
    }

    /// Switch the illuminator on if the settings ask for it and wait for it
    /// to warm up. `Ok(None)` when IR is disabled.
    async fn engage_illuminator(&mut self) -> Result<Option<IlluminatorGuard>, ControllerError> {
        if !self.settings.illuminator {
            return Ok(None);
        }
        let illuminator = self
            .illuminator
            .as_ref()
            .ok_or(IlluminatorError::Unavailable)?;
        let guard = illuminator.engage()?;
        self.pause(Instant::now() + self.timing.illuminator_warmup).await;
        Ok(Some(guard))
    }

    fn next_frame_path(&self) -> PathBuf {
        self.settings
            .staging_dir
            .join(storage::frame_file_name(&self.run_id, self.frames))
    }

    fn record_frame(&mut self, lock: Option<ExposureLock>) {
        self.frames += 1;
        self.exposure_lock = lock;
        debug!(run_id = %self.run_id, frame = self.frames, "Frame stored");
        (self.on_frame)(self.frames, lock);
    }

    fn finished(&self, deadline: Instant) -> bool {
        self.cancelled() || Instant::now() >= deadline
    }
}

async fn run_discrete(ctx: &mut RunContext) -> Result<(), ControllerError> {
    let delay = ctx.interval.frame_delay();
    let deadline = Instant::now() + ctx.interval.duration();

    while !ctx.finished(deadline) {
        let frame_start = Instant::now();

        let lamp = ctx.engage_illuminator().await?;
        if ctx.cancelled() {
            break;
        }

        let camera = Arc::clone(&ctx.camera);
        let resolution = ctx.settings.resolution;
        let gain = ctx.settings.fixed_exposure().then_some(ctx.settings.gain);
        let existing = ctx.exposure_lock;
        let settle = ctx.timing.exposure_settle;
        let path = ctx.next_frame_path();

        let lock = tokio::task::spawn_blocking(move || -> CameraResult<Option<ExposureLock>> {
            let mut session = camera.open(resolution)?;
            let lock = prepare_exposure(session.as_mut(), gain, existing, settle)?;
            session.capture_frame(&path)?;
            Ok(lock)
        })
        .await??;
        drop(lamp);

        ctx.record_frame(lock);

        if !ctx.pause((frame_start + delay).min(deadline)).await {
            break;
        }
    }

    Ok(())
}

async fn run_continuous(ctx: &mut RunContext) -> Result<(), ControllerError> {
    let delay = ctx.interval.frame_delay();
    let deadline = Instant::now() + ctx.interval.duration();

    let lamp = ctx.engage_illuminator().await?;
    if ctx.cancelled() {
        return Ok(());
    }

    let camera = Arc::clone(&ctx.camera);
    let resolution = ctx.settings.resolution;
    let gain = ctx.settings.fixed_exposure().then_some(ctx.settings.gain);
    let settle = ctx.timing.exposure_settle;

    let (session, lock) = tokio::task::spawn_blocking(
        move || -> CameraResult<(Box<dyn CameraSession>, Option<ExposureLock>)> {
            let mut session = camera.open(resolution)?;
            let lock = prepare_exposure(session.as_mut(), gain, None, settle)?;
            Ok((session, lock))
        },
    )
    .await??;
    ctx.exposure_lock = lock;

    // The session travels to the blocking pool for each capture and back
    let mut session = Some(session);

    while !ctx.finished(deadline) {
        let frame_start = Instant::now();

        let Some(mut open) = session.take() else {
            break;
        };
        let path = ctx.next_frame_path();
        let (open, result) = tokio::task::spawn_blocking(move || {
            let result = open.capture_frame(&path);
            (open, result)
        })
        .await?;
        session = Some(open);
        result?;

        ctx.record_frame(lock);

        if !ctx.pause((frame_start + delay).min(deadline)).await {
            break;
        }
    }

    drop(session);
    drop(lamp);
    Ok(())
}
