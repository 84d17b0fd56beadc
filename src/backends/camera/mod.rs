// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! The capture core needs very little from a camera: open it at a resolution,
//! optionally fix gain and freeze exposure, and write stills to disk.
//!
//! ```text
//! CameraDevice::open(resolution) ──► CameraSession ──► capture_frame(path)
//!                                         │
//!                                         └─ closed on drop
//! ```

pub mod rpicam;
pub mod types;

pub use rpicam::RpicamCamera;
pub use types::*;

use std::path::Path;
use std::time::Duration;

/// A camera that can be opened for still capture
///
/// Implementations must be cheap to share; the controller keeps one instance
/// for the lifetime of the process and opens sessions from worker threads.
pub trait CameraDevice: Send + Sync {
    /// Open the camera at the given resolution
    ///
    /// The returned session owns the camera until it is dropped.
    fn open(&self, resolution: Resolution) -> CameraResult<Box<dyn CameraSession>>;
}

/// An open camera
///
/// All calls block; callers run them on blocking worker threads.
pub trait CameraSession: Send {
    /// Request a fixed sensitivity (ISO-equivalent, e.g. 100..=800)
    fn set_gain(&mut self, iso: u32) -> CameraResult<()>;

    /// Let auto exposure and white balance settle for `settle`, then report
    /// the values they converged to
    fn await_exposure_convergence(&mut self, settle: Duration) -> CameraResult<ExposureLock>;

    /// Freeze shutter speed and white balance for all following frames
    fn lock_exposure(&mut self, lock: &ExposureLock) -> CameraResult<()>;

    /// Capture one encoded still to `destination`
    fn capture_frame(&mut self, destination: &Path) -> CameraResult<()>;
}

/// Apply the fixed-exposure sequence to an open session
///
/// Without a gain the camera stays in auto exposure and `None` is returned.
/// Otherwise the gain is set and either `existing` is re-applied or, for the
/// first frame of a run, the camera is metered for `settle` and the converged
/// values become the run's lock.
pub fn prepare_exposure(
    session: &mut dyn CameraSession,
    gain: Option<u32>,
    existing: Option<ExposureLock>,
    settle: Duration,
) -> CameraResult<Option<ExposureLock>> {
    let Some(iso) = gain else {
        return Ok(None);
    };

    session.set_gain(iso)?;
    let lock = match existing {
        Some(lock) => lock,
        None => session.await_exposure_convergence(settle)?,
    };
    session.lock_exposure(&lock)?;
    Ok(Some(lock))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ScriptedSession {
        calls: Vec<String>,
    }

    impl CameraSession for ScriptedSession {
        fn set_gain(&mut self, iso: u32) -> CameraResult<()> {
            self.calls.push(format!("gain {iso}"));
            Ok(())
        }

        fn await_exposure_convergence(&mut self, _settle: Duration) -> CameraResult<ExposureLock> {
            self.calls.push("converge".to_string());
            Ok(ExposureLock {
                shutter_us: 20_000,
                awb_gains: (1.5, 1.2),
            })
        }

        fn lock_exposure(&mut self, lock: &ExposureLock) -> CameraResult<()> {
            self.calls.push(format!("lock {}", lock.shutter_us));
            Ok(())
        }

        fn capture_frame(&mut self, _destination: &Path) -> CameraResult<()> {
            self.calls.push("capture".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_prepare_exposure_auto_mode_is_untouched() {
        let mut session = ScriptedSession::default();
        let lock = prepare_exposure(&mut session, None, None, Duration::ZERO).unwrap();
        assert!(lock.is_none());
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_prepare_exposure_meters_only_without_existing_lock() {
        let mut session = ScriptedSession::default();
        let lock = prepare_exposure(&mut session, Some(400), None, Duration::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(session.calls, ["gain 400", "converge", "lock 20000"]);

        let mut session = ScriptedSession::default();
        prepare_exposure(&mut session, Some(400), Some(lock), Duration::ZERO).unwrap();
        assert_eq!(session.calls, ["gain 400", "lock 20000"]);
    }
}
