// SPDX-License-Identifier: GPL-3.0-only

//! Timelapse job controller
//!
//! One run at a time moves through a small state machine on a background
//! task; movie assembly for a finished run happens on its own task so a new
//! run can start while the previous movie is still being encoded.
//!
//! ```text
//! Idle ──start()──► WaitingForStart ──start time──► Capturing ──► Stopped ──► Idle
//!                        │                              │            │
//!                        └──────── stop() ──────────────┘            └──► encode task
//! ```
//!
//! Request handlers and the run task share [`JobState`], [`ScheduleInterval`]
//! and [`CameraSettings`] behind a single mutex. Cancellation is a
//! `watch` channel observed at every suspension point, so `stop()` takes
//! effect at the next sleep rather than after it.

pub mod schedule;
pub mod settings;
pub mod state;
pub mod strategy;

pub use schedule::{ScheduleInterval, parse_start};
pub use settings::CameraSettings;
pub use state::{JobState, JobStatus, Phase};
pub use strategy::CaptureStrategy;

use crate::backends::camera::CameraDevice;
use crate::constants::MOVIE_FRAMERATE;
use crate::constants::timing::{EXPOSURE_SETTLE, ILLUMINATOR_WARMUP, START_POLL_INTERVAL};
use crate::errors::{ControllerError, IlluminatorError};
use crate::illuminator::Illuminator;
use crate::pipelines::video::{EncodeJob, VideoEncoder, assemble};
use crate::storage;
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strategy::RunContext;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Floor for the start poll so a zero interval cannot spin
const MIN_START_POLL: Duration = Duration::from_millis(10);

/// Hardware timing used by runs and previews
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Metering time before exposure is frozen
    pub exposure_settle: Duration,
    /// Delay between switching the illuminator on and the first capture
    pub illuminator_warmup: Duration,
    /// Longest single sleep while waiting for the scheduled start
    pub start_poll: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            exposure_settle: EXPOSURE_SETTLE,
            illuminator_warmup: ILLUMINATOR_WARMUP,
            start_poll: START_POLL_INTERVAL,
        }
    }
}

/// Outcome of one run's capture phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    /// `None` when the run was stopped before its start time
    pub strategy: Option<CaptureStrategy>,
    pub frames: u64,
    /// Hardware failure that ended the run early
    pub error: Option<String>,
    /// Whether movie assembly was queued for this run
    pub encode_queued: bool,
}

/// Handle to a started run
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Wait for the capture phase to end (encoding may still be running)
    pub async fn wait(self) -> Result<RunReport, ControllerError> {
        Ok(self.task.await?)
    }
}

struct Inner {
    job: JobState,
    interval: ScheduleInterval,
    settings: CameraSettings,
    /// Present while a run is active
    cancel: Option<watch::Sender<bool>>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Mirrors `JobState::is_active`
    activity: watch::Sender<bool>,
    /// Serializes movie assembly on the staging area
    encode_lock: tokio::sync::Mutex<()>,
    camera: Arc<dyn CameraDevice>,
    encoder: Arc<dyn VideoEncoder>,
    illuminator: Option<Arc<Illuminator>>,
    timing: CaptureTiming,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state under the lock and publish the resulting activity
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner);
        self.activity.send_replace(inner.job.is_active());
        result
    }
}

/// Clears the preview flag even if the preview future is dropped
struct PreviewSlot(Arc<Shared>);

impl Drop for PreviewSlot {
    fn drop(&mut self) {
        self.0.update(|inner| inner.job.previewing = false);
    }
}

/// Returns the controller to idle if the run task unwinds before it finishes
struct RunCleanup {
    shared: Arc<Shared>,
    armed: bool,
}

impl RunCleanup {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::clone(shared),
            armed: true,
        }
    }

    /// The run reached its own teardown
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!("Run task ended without teardown, returning to idle");
        self.shared.update(|inner| {
            inner.job.running = false;
            inner.job.phase = Phase::Idle;
            inner.job.last_error = Some("capture task ended unexpectedly".to_string());
            inner.cancel = None;
        });
    }
}

/// Owns the schedule, the camera settings and the state of the current run
///
/// Cheap to clone; all clones drive the same controller. Every operation is
/// safe to call concurrently from request handlers.
#[derive(Clone)]
pub struct TimelapseController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TimelapseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("TimelapseController")
            .field("job", &inner.job)
            .field("interval", &inner.interval)
            .field("settings", &inner.settings)
            .finish()
    }
}

impl TimelapseController {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        encoder: Arc<dyn VideoEncoder>,
        illuminator: Option<Arc<Illuminator>>,
        settings: CameraSettings,
        timing: CaptureTiming,
    ) -> Self {
        let (activity, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    job: JobState::default(),
                    interval: ScheduleInterval::default(),
                    settings,
                    cancel: None,
                }),
                activity,
                encode_lock: tokio::sync::Mutex::new(()),
                camera,
                encoder,
                illuminator,
                timing,
            }),
        }
    }

    /// Begin a run with the current schedule and settings
    ///
    /// Must be called from within a tokio runtime. Rejected while a run is
    /// active or a preview holds the camera.
    pub fn start(&self) -> Result<RunHandle, ControllerError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (run_id, interval, settings) = self.shared.update(|inner| {
            if inner.job.running || inner.job.previewing {
                return Err(ControllerError::NotAvailable);
            }
            let effective_start = inner.interval.start().max(Local::now());
            // a run id must not reuse the frames or movie of an earlier run
            let mut taken = inner.job.pending_encodes.clone();
            taken.extend(inner.job.run_id.clone());
            let run_id = storage::unique_run_id(storage::run_id(effective_start), &taken);
            inner.job.begin_run(run_id.clone());
            inner.cancel = Some(cancel_tx);
            Ok((run_id, inner.interval, inner.settings.clone()))
        })?;

        info!(
            run_id = %run_id,
            start = %interval.start(),
            duration_hours = interval.duration_hours(),
            acceleration = interval.acceleration(),
            "Timelapse run accepted"
        );

        let task = tokio::spawn(run_job(
            Arc::clone(&self.shared),
            run_id.clone(),
            interval,
            settings,
            cancel_rx,
        ));
        Ok(RunHandle { run_id, task })
    }

    /// Ask the active run to stop; returns whether there was one
    ///
    /// The run notices at its next suspension point. A run stopped while
    /// capturing still has its frames assembled into a movie.
    pub fn stop(&self) -> bool {
        let inner = self.shared.lock();
        match &inner.cancel {
            Some(cancel) => {
                cancel.send_replace(true);
                info!(run_id = ?inner.job.run_id, phase = inner.job.phase.display_name(), "Stop requested");
                true
            }
            None => {
                debug!("Stop requested with no active run");
                false
            }
        }
    }

    /// Replace the schedule from raw operator input
    ///
    /// Invalid values degrade to defaults; only an active run makes this fail.
    pub fn set_interval(
        &self,
        start: Option<&str>,
        duration_hours: Option<f64>,
        acceleration: Option<f64>,
    ) -> Result<ScheduleInterval, ControllerError> {
        let interval = ScheduleInterval::from_request(start, duration_hours, acceleration);
        self.replace_interval(interval)?;
        Ok(interval)
    }

    /// Replace the schedule wholesale
    pub fn replace_interval(&self, interval: ScheduleInterval) -> Result<(), ControllerError> {
        let interval = ScheduleInterval::new(
            Some(interval.start()),
            interval.duration_hours(),
            interval.acceleration(),
        );
        self.shared.update(|inner| {
            if inner.job.running {
                return Err(ControllerError::NotAvailable);
            }
            inner.interval = interval;
            Ok(())
        })?;
        info!(
            start = %interval.start(),
            duration_hours = interval.duration_hours(),
            acceleration = interval.acceleration(),
            strategy = CaptureStrategy::for_interval(&interval).display_name(),
            "Schedule updated"
        );
        Ok(())
    }

    /// Replace the camera settings wholesale; rejected while a run is active
    pub fn set_cam_settings(&self, settings: CameraSettings) -> Result<(), ControllerError> {
        let resolution = settings.resolution;
        let gain = settings.gain;
        self.shared.update(|inner| {
            if inner.job.running {
                return Err(ControllerError::NotAvailable);
            }
            inner.settings = settings;
            Ok(())
        })?;
        info!(%resolution, gain, "Camera settings updated");
        Ok(())
    }

    /// Capture one still into the staging directory
    ///
    /// Returns the file's path relative to the staging directory.
    pub async fn capture_preview(&self) -> Result<PathBuf, ControllerError> {
        let settings = self.shared.update(|inner| {
            if inner.job.running || inner.job.previewing {
                return Err(ControllerError::NotAvailable);
            }
            inner.job.previewing = true;
            Ok(inner.settings.clone())
        })?;
        // travels into the blocking capture so the flag outlives a dropped future
        let slot = PreviewSlot(Arc::clone(&self.shared));

        let lamp = if settings.illuminator {
            let illuminator = self
                .shared
                .illuminator
                .as_ref()
                .ok_or(IlluminatorError::Unavailable)?;
            let guard = illuminator.engage()?;
            tokio::time::sleep(self.shared.timing.illuminator_warmup).await;
            Some(guard)
        } else {
            None
        };

        let name = storage::preview_file_name(Local::now());
        let staging = settings.staging_dir.clone();
        let destination = staging.join(&name);
        let camera = Arc::clone(&self.shared.camera);
        let resolution = settings.resolution;
        let gain = settings.fixed_exposure().then_some(settings.gain);

        tokio::task::spawn_blocking(move || -> Result<(), ControllerError> {
            let _slot = slot;
            storage::ensure_dir(&staging)?;
            let mut session = camera.open(resolution)?;
            if let Some(gain) = gain {
                session.set_gain(gain)?;
            }
            session.capture_frame(&destination)?;
            Ok(())
        })
        .await??;
        drop(lamp);

        info!(file = %name, "Preview captured");
        Ok(PathBuf::from(name))
    }

    /// Whether a run is active or a movie is being assembled
    pub fn status(&self) -> bool {
        self.shared.lock().job.is_active()
    }

    pub fn current_interval(&self) -> ScheduleInterval {
        self.shared.lock().interval
    }

    pub fn cam_settings(&self) -> CameraSettings {
        self.shared.lock().settings.clone()
    }

    /// Snapshot of the whole controller
    pub fn job_status(&self) -> JobStatus {
        let inner = self.shared.lock();
        JobStatus::new(&inner.job, inner.interval, inner.settings.clone())
    }

    /// Resolve once no run is active and no movie is pending
    pub async fn wait_idle(&self) {
        let mut activity = self.shared.activity.subscribe();
        // the sender lives as long as `self`
        let _ = activity.wait_for(|active| !*active).await;
    }
}

/// Body of the run task
async fn run_job(
    shared: Arc<Shared>,
    run_id: String,
    interval: ScheduleInterval,
    settings: CameraSettings,
    mut cancel: watch::Receiver<bool>,
) -> RunReport {
    let cleanup = RunCleanup::new(&shared);

    if !wait_for_start(&run_id, &interval, shared.timing.start_poll, &mut cancel).await {
        info!(run_id = %run_id, "Run stopped before its start time");
        shared.update(|inner| {
            inner.job.running = false;
            inner.job.phase = Phase::Idle;
            inner.cancel = None;
        });
        cleanup.disarm();
        return RunReport {
            run_id,
            strategy: None,
            frames: 0,
            error: None,
            encode_queued: false,
        };
    }

    let strategy = CaptureStrategy::for_interval(&interval);
    shared.update(|inner| {
        inner.job.phase = Phase::Capturing;
        inner.job.strategy = Some(strategy);
    });

    let progress = Arc::clone(&shared);
    let mut ctx = RunContext {
        run_id: run_id.clone(),
        interval,
        settings: settings.clone(),
        camera: Arc::clone(&shared.camera),
        illuminator: shared.illuminator.clone(),
        timing: shared.timing,
        cancel,
        frames: 0,
        exposure_lock: None,
        on_frame: Box::new(move |frames, lock| {
            progress.update(|inner| {
                inner.job.frames_captured = frames;
                inner.job.exposure_lock = lock;
            });
        }),
    };

    let result = match prepare_staging(&shared, &settings).await {
        Ok(()) => strategy.run(&mut ctx).await,
        Err(e) => Err(e),
    };

    let error = result.err().map(|e| {
        error!(run_id = %run_id, error = %e, frames = ctx.frames, "Run aborted");
        e.to_string()
    });
    let frames = ctx.frames;
    let stopped = ctx.cancelled();
    drop(ctx);

    shared.update(|inner| inner.job.phase = Phase::Stopped);
    info!(run_id = %run_id, frames, stopped, "Capture finished");

    let job = EncodeJob::for_run(&run_id, &settings.staging_dir, &settings.output_dir, MOVIE_FRAMERATE);
    shared.update(|inner| {
        inner.job.frames_captured = frames;
        if let Some(e) = &error {
            inner.job.last_error = Some(e.clone());
        }
        inner.job.pending_encodes.push(run_id.clone());
        inner.job.running = false;
        inner.job.phase = Phase::Idle;
        inner.cancel = None;
    });
    cleanup.disarm();
    tokio::spawn(encode_run(Arc::clone(&shared), job));

    RunReport {
        run_id,
        strategy: Some(strategy),
        frames,
        error,
        encode_queued: true,
    }
}

/// Sleep until the scheduled start; `false` if stopped first
async fn wait_for_start(
    run_id: &str,
    interval: &ScheduleInterval,
    poll: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> bool {
    let poll = poll.max(MIN_START_POLL);
    let mut announced = false;

    loop {
        if *cancel.borrow() {
            return false;
        }
        let Some(remaining) = interval.until_start(Local::now()) else {
            return true;
        };
        if !announced {
            info!(run_id, wait_secs = remaining.as_secs(), "Waiting for scheduled start");
            announced = true;
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining.min(poll)) => {}
            _ = cancel.wait_for(|stop| *stop) => return false,
        }
    }
}

/// Create the staging and output directories and purge stale stills
async fn prepare_staging(shared: &Shared, settings: &CameraSettings) -> Result<(), ControllerError> {
    let keep = shared.lock().job.pending_encodes.clone();
    let staging = settings.staging_dir.clone();
    let output = settings.output_dir.clone();

    tokio::task::spawn_blocking(move || -> Result<(), ControllerError> {
        storage::ensure_dir(&staging)?;
        storage::ensure_dir(&output)?;
        storage::purge_stale(&staging, &keep)?;
        Ok(())
    })
    .await?
}

/// Assemble one run's movie, one encode at a time
async fn encode_run(shared: Arc<Shared>, job: EncodeJob) {
    let result = {
        let _serial = shared.encode_lock.lock().await;
        assemble(Arc::clone(&shared.encoder), job.clone()).await
    };

    shared.update(|inner| {
        inner.job.pending_encodes.retain(|id| id != &job.run_id);
        if let Err(e) = &result {
            // only attribute the failure while this run is still the latest
            if inner.job.run_id.as_deref() == Some(job.run_id.as_str()) {
                inner.job.last_error = Some(e.to_string());
            }
        }
    });

    if let Err(e) = result {
        warn!(run_id = %job.run_id, error = %e, "No movie produced for run");
    }
}
