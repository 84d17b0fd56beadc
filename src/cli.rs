// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the station
//!
//! This module provides command-line functionality for:
//! - Running a timelapse in the foreground
//! - Capturing preview stills
//! - Switching the IR illuminator
//! - Reading the temperature/humidity sensor
//! - Printing and storing the configuration

use nightowl::backends::camera::{RpicamCamera, rpicam};
use nightowl::illuminator::Illuminator;
use nightowl::pipelines::video::FfmpegEncoder;
use nightowl::sensor::{Aht20, PiI2c};
use nightowl::timelapse::{CameraSettings, CaptureStrategy, ScheduleInterval, TimelapseController};
use nightowl::{Config, storage};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Schedule flags as typed by the operator
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    pub start: Option<String>,
    pub duration: Option<f64>,
    pub acceleration: Option<f64>,
}

/// Camera flags as typed by the operator
#[derive(Debug, Clone, Default)]
pub struct CameraRequest {
    pub resolution: Option<String>,
    pub gain: Option<i64>,
    pub ir: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum LightsCommand {
    On,
    Off,
    Toggle,
    Status,
}

fn camera_settings(config: &Config, request: &CameraRequest) -> CameraSettings {
    let defaults = config.camera_settings();
    CameraSettings::from_request(
        request
            .resolution
            .as_deref()
            .or(Some(defaults.resolution.tag())),
        request.gain.or(Some(i64::from(defaults.gain))),
        request.ir || defaults.illuminator,
        defaults.staging_dir,
        defaults.output_dir,
    )
}

fn build_controller(
    config: &Config,
    settings: CameraSettings,
) -> Result<TimelapseController, Box<dyn std::error::Error>> {
    let illuminator = if settings.illuminator {
        Some(Arc::new(Illuminator::open_gpio(&config.illuminator_lines)?))
    } else {
        None
    };
    let camera = RpicamCamera::new(rpicam::resolve_command(&config.camera_command));
    let encoder = FfmpegEncoder::new(config.encoder_command.clone());

    Ok(TimelapseController::new(
        Arc::new(camera),
        Arc::new(encoder),
        illuminator,
        settings,
        config.timing(),
    ))
}

/// Run one timelapse in the foreground
pub fn run_timelapse(
    config: &Config,
    schedule: ScheduleRequest,
    camera: CameraRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = camera_settings(config, &camera);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let controller = build_controller(config, settings.clone())?;
        let interval = controller.set_interval(
            schedule.start.as_deref(),
            schedule.duration,
            schedule.acceleration,
        )?;

        println!("Start:        {}", interval.start().format("%Y-%m-%d %H:%M:%S"));
        println!("Duration:     {} h", interval.duration_hours());
        println!(
            "Frame delay:  {:.1} s ({})",
            interval.frame_delay().as_secs_f64(),
            CaptureStrategy::for_interval(&interval).display_name()
        );
        println!("Frames:       ~{}", interval.expected_frames());
        println!("Resolution:   {}", settings.resolution);
        println!("Output:       {}", settings.output_dir.display());
        println!();
        println!("Press Ctrl+C to stop early; captured frames are still rendered.");

        let handle = controller.start()?;
        let run_id = handle.run_id().to_string();

        let stopper = controller.clone();
        ctrlc::set_handler(move || {
            stopper.stop();
        })?;

        let wait = handle.wait();
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let report = loop {
            tokio::select! {
                report = &mut wait => break report?,
                _ = ticker.tick() => {
                    let status = controller.job_status();
                    print!(
                        "\r{:<18} frames: {}",
                        status.phase.display_name(),
                        status.frames_captured
                    );
                    std::io::stdout().flush()?;
                }
            }
        };
        println!();

        if let Some(e) = &report.error {
            eprintln!("Run aborted: {e}");
        }
        println!("Captured {} frames", report.frames);

        if report.encode_queued {
            println!("Rendering movie...");
            controller.wait_idle().await;
            let movie = settings.output_dir.join(storage::movie_file_name(&run_id));
            if movie.exists() {
                println!("Movie saved: {}", movie.display());
            } else if let Some(e) = controller.job_status().last_error {
                eprintln!("No movie produced: {e}");
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Capture one preview still
pub fn capture_preview(config: &Config, camera: CameraRequest) -> Result<(), Box<dyn std::error::Error>> {
    let settings = camera_settings(config, &camera);
    let staging = settings.staging_dir.clone();
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let controller = build_controller(config, settings)?;
        let name = controller.capture_preview().await?;
        println!("Preview saved: {}", staging.join(name).display());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Switch or query the IR illuminator
pub fn lights(config: &Config, command: LightsCommand) -> Result<(), Box<dyn std::error::Error>> {
    let illuminator = Illuminator::open_gpio(&config.illuminator_lines)?;
    let on = match command {
        LightsCommand::On => {
            illuminator.turn_on()?;
            true
        }
        LightsCommand::Off => {
            illuminator.turn_off()?;
            false
        }
        LightsCommand::Toggle => illuminator.toggle()?,
        LightsCommand::Status => illuminator.status(),
    };
    println!("Illuminator: {}", if on { "on" } else { "off" });
    Ok(())
}

/// Print one temperature/humidity reading
pub fn read_sensor(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let bus = PiI2c::open(config.i2c_bus, config.sensor_address)?;
    let mut sensor = Aht20::new(bus)?;
    let reading = sensor.measure()?;
    println!("Temperature: {:.1} °C", reading.temperature);
    println!("Humidity:    {:.1} %", reading.humidity);
    Ok(())
}

/// Print the effective configuration, optionally storing it
///
/// With `--config` the file named there is written, otherwise the default
/// location.
pub fn show_config(config: &Config, path: Option<&Path>, write: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        let written = path.map(Path::to_path_buf).or_else(Config::config_path);
        if let Some(written) = written {
            eprintln!("Configuration written to {}", written.display());
        }
    }
    Ok(())
}

/// Print the schedule and settings a `run` with the same flags would use
pub fn show_status(
    config: &Config,
    schedule: ScheduleRequest,
    camera: CameraRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = ScheduleInterval::from_request(
        schedule.start.as_deref(),
        schedule.duration,
        schedule.acceleration,
    );
    let settings = camera_settings(config, &camera);

    let status = serde_json::json!({
        "version": nightowl::constants::app_version(),
        "interval": interval,
        "frame_delay_secs": interval.frame_delay().as_secs_f64(),
        "strategy": CaptureStrategy::for_interval(&interval),
        "expected_frames": interval.expected_frames(),
        "settings": settings,
        "latest_movie": storage::latest_movie(&settings.output_dir),
        "config_path": Config::config_path(),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
