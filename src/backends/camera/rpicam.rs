// SPDX-License-Identifier: GPL-3.0-only

//! Still capture through the libcamera apps (`rpicam-still`)
//!
//! Every operation is a single `rpicam-still` invocation built from an
//! argument vector. The session only accumulates the options (resolution,
//! gain, frozen exposure) that each capture has to repeat.

use super::types::*;
use super::{CameraDevice, CameraSession};
use crate::errors::CameraError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;
use tracing::{debug, info};

/// Capture timeout used in auto exposure mode, long enough for AE to settle
const AUTO_EXPOSURE_TIMEOUT_MS: u64 = 1000;

/// Raspberry Pi camera driven through `rpicam-still`
#[derive(Debug, Clone)]
pub struct RpicamCamera {
    command: String,
}

impl RpicamCamera {
    /// Use the given capture command (normally `rpicam-still`)
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Capture command this camera invokes
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl CameraDevice for RpicamCamera {
    fn open(&self, resolution: Resolution) -> CameraResult<Box<dyn CameraSession>> {
        let output = run(&self.command, &["--list-cameras".to_string()])?;
        let listing = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if listing.contains("No cameras available") {
            return Err(CameraError::CaptureFailed(
                "no camera detected by libcamera".to_string(),
            ));
        }

        debug!(command = %self.command, %resolution, "Camera opened");
        Ok(Box::new(RpicamSession {
            command: self.command.clone(),
            resolution,
            gain: None,
            lock: None,
        }))
    }
}

/// Open `rpicam-still` session
#[derive(Debug)]
struct RpicamSession {
    command: String,
    resolution: Resolution,
    gain: Option<f32>,
    lock: Option<ExposureLock>,
}

impl RpicamSession {
    /// Options shared by metering and capture invocations
    fn base_args(&self) -> Vec<String> {
        let (width, height) = self.resolution.dimensions();
        let mut args = vec![
            "--nopreview".to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
        ];
        if let Some(gain) = self.gain {
            args.push("--gain".to_string());
            args.push(format!("{gain:.2}"));
        }
        args
    }

    fn capture_args(&self, destination: &Path) -> Vec<String> {
        let mut args = self.base_args();
        match &self.lock {
            Some(lock) => {
                args.push("--shutter".to_string());
                args.push(lock.shutter_us.to_string());
                args.push("--awbgains".to_string());
                args.push(format!("{:.4},{:.4}", lock.awb_gains.0, lock.awb_gains.1));
                args.push("--immediate".to_string());
            }
            None => {
                args.push("--timeout".to_string());
                args.push(AUTO_EXPOSURE_TIMEOUT_MS.to_string());
            }
        }
        args.push("--encoding".to_string());
        args.push("jpg".to_string());
        args.push("--output".to_string());
        args.push(destination.display().to_string());
        args
    }
}

impl CameraSession for RpicamSession {
    fn set_gain(&mut self, iso: u32) -> CameraResult<()> {
        // libcamera expresses sensitivity as analogue gain, ISO 100 == 1.0
        self.gain = Some(iso as f32 / 100.0);
        Ok(())
    }

    fn await_exposure_convergence(&mut self, settle: Duration) -> CameraResult<ExposureLock> {
        let mut args = self.base_args();
        args.extend([
            "--timeout".to_string(),
            settle.as_millis().max(1).to_string(),
            "--metadata".to_string(),
            "-".to_string(),
            "--metadata-format".to_string(),
            "json".to_string(),
            "--output".to_string(),
            "/dev/null".to_string(),
        ]);

        let output = run(&self.command, &args)?;
        let lock = parse_exposure_metadata(&String::from_utf8_lossy(&output.stdout))?;
        info!(%lock, "Exposure converged");
        Ok(lock)
    }

    fn lock_exposure(&mut self, lock: &ExposureLock) -> CameraResult<()> {
        self.lock = Some(*lock);
        Ok(())
    }

    fn capture_frame(&mut self, destination: &Path) -> CameraResult<()> {
        let args = self.capture_args(destination);
        run(&self.command, &args)?;
        debug!(path = %destination.display(), "Still captured");
        Ok(())
    }
}

impl Drop for RpicamSession {
    fn drop(&mut self) {
        debug!(resolution = %self.resolution, "Camera closed");
    }
}

/// Run the capture command, turning launch failures and non-zero exits into
/// camera errors
fn run(command: &str, args: &[String]) -> CameraResult<Output> {
    debug!(command, ?args, "Invoking camera");

    let output = Command::new(command)
        .args(args)
        .output()
        .map_err(|source| CameraError::Launch {
            command: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(CameraError::CommandFailed {
            command: command.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output)
}

/// Last non-empty line of stderr, which is where the libcamera apps put
/// the actual reason for a failure
fn stderr_tail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

#[derive(Deserialize)]
struct FrameMetadata {
    #[serde(rename = "ExposureTime")]
    exposure_time: u32,
    #[serde(rename = "ColourGains")]
    colour_gains: [f32; 2],
}

/// Extract shutter speed and white balance gains from the JSON metadata
/// block printed by `--metadata -`
pub fn parse_exposure_metadata(stdout: &str) -> CameraResult<ExposureLock> {
    let (Some(start), Some(end)) = (stdout.find('{'), stdout.rfind('}')) else {
        return Err(CameraError::InvalidMetadata(
            "no metadata block in output".to_string(),
        ));
    };
    if end < start {
        return Err(CameraError::InvalidMetadata(
            "malformed metadata block".to_string(),
        ));
    }

    let meta: FrameMetadata = serde_json::from_str(&stdout[start..=end])
        .map_err(|e| CameraError::InvalidMetadata(e.to_string()))?;

    if meta.exposure_time == 0 {
        return Err(CameraError::InvalidMetadata(
            "exposure time is zero".to_string(),
        ));
    }

    Ok(ExposureLock {
        shutter_us: meta.exposure_time,
        awb_gains: (meta.colour_gains[0], meta.colour_gains[1]),
    })
}

/// Resolve the capture command, preferring the new `rpicam-still` name and
/// falling back to the legacy `libcamera-still` if only that is installed
pub fn resolve_command(preferred: &str) -> String {
    let candidates = [preferred, "rpicam-still", "libcamera-still"];
    for candidate in candidates {
        if Path::new(candidate).is_absolute() {
            if Path::new(candidate).exists() {
                return candidate.to_string();
            }
            continue;
        }
        let found = std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths).any(|dir| PathBuf::from(dir).join(candidate).exists())
            })
            .unwrap_or(false);
        if found {
            return candidate.to_string();
        }
    }
    preferred.to_string()
}
