// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use nightowl::Config;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "nightowl")]
#[command(about = "Nocturnal wildlife monitoring station")]
#[command(version = nightowl::constants::app_version())]
struct Cli {
    /// Configuration file (default: ~/.config/nightowl/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory stills are staged in
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,

    /// Directory finished movies are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct CameraArgs {
    /// Still resolution, e.g. 1280x720
    #[arg(short, long)]
    resolution: Option<String>,

    /// ISO-equivalent gain; 0 keeps auto exposure
    #[arg(short, long, allow_negative_numbers = true)]
    gain: Option<i64>,

    /// Switch the IR illuminator on while capturing
    #[arg(long)]
    ir: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ScheduleArgs {
    /// Start time: RFC 3339, HH:MM or decimal hour (default: now)
    #[arg(short, long)]
    start: Option<String>,

    /// Run length in hours
    #[arg(short, long)]
    duration: Option<f64>,

    /// Real time divided by movie time
    #[arg(short, long)]
    acceleration: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one timelapse in the foreground (Ctrl+C stops and renders)
    Run {
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Capture a single preview still
    Preview {
        #[command(flatten)]
        camera: CameraArgs,
    },

    /// Control the IR illuminator
    Lights {
        #[arg(value_enum)]
        action: LightsAction,
    },

    /// Read the temperature/humidity sensor
    Sensor,

    /// Print the effective configuration
    Config {
        /// Also store it as the configuration file
        #[arg(long)]
        write: bool,
    },

    /// Show the resolved schedule, settings and latest movie as JSON
    Status {
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        camera: CameraArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LightsAction {
    On,
    Off,
    Toggle,
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to override, e.g. RUST_LOG=nightowl=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,nightowl=info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(dir) = cli.staging_dir {
        config.staging_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Commands::Run { schedule, camera } => cli::run_timelapse(
            &config,
            cli::ScheduleRequest {
                start: schedule.start,
                duration: schedule.duration,
                acceleration: schedule.acceleration,
            },
            camera_request(camera),
        ),
        Commands::Preview { camera } => cli::capture_preview(&config, camera_request(camera)),
        Commands::Lights { action } => cli::lights(
            &config,
            match action {
                LightsAction::On => cli::LightsCommand::On,
                LightsAction::Off => cli::LightsCommand::Off,
                LightsAction::Toggle => cli::LightsCommand::Toggle,
                LightsAction::Status => cli::LightsCommand::Status,
            },
        ),
        Commands::Sensor => cli::read_sensor(&config),
        Commands::Config { write } => cli::show_config(&config, cli.config.as_deref(), write),
        Commands::Status { schedule, camera } => cli::show_status(
            &config,
            cli::ScheduleRequest {
                start: schedule.start,
                duration: schedule.duration,
                acceleration: schedule.acceleration,
            },
            camera_request(camera),
        ),
    }
}

fn camera_request(args: CameraArgs) -> cli::CameraRequest {
    cli::CameraRequest {
        resolution: args.resolution,
        gain: args.gain,
        ir: args.ir,
    }
}
