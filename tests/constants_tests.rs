// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use nightowl::constants::{self, MOVIE_FRAMERATE, files, schedule, timing};
use nightowl::timelapse::{CaptureStrategy, ScheduleInterval};
use std::time::Duration;

#[test]
fn test_default_schedule_is_continuous() {
    // 240 / 24 = 10 s between frames
    let interval = ScheduleInterval::new(None, schedule::DEFAULT_DURATION_HOURS, schedule::DEFAULT_ACCELERATION);
    assert_eq!(interval.frame_delay(), Duration::from_secs(10));
    assert_eq!(CaptureStrategy::for_interval(&interval), CaptureStrategy::Continuous);
}

#[test]
fn test_threshold_acceleration() {
    // The smallest acceleration that switches to discrete capture
    let acceleration = timing::DISCRETE_STRATEGY_THRESHOLD.as_secs_f64() * f64::from(MOVIE_FRAMERATE);
    let at = ScheduleInterval::new(None, 1.0, acceleration);
    assert_eq!(CaptureStrategy::for_interval(&at), CaptureStrategy::Discrete);

    let below = ScheduleInterval::new(None, 1.0, acceleration - 0.5);
    assert_eq!(CaptureStrategy::for_interval(&below), CaptureStrategy::Continuous);
}

#[test]
fn test_start_poll_bounds_stop_latency() {
    assert!(timing::START_POLL_INTERVAL <= Duration::from_secs(1));
}

#[test]
fn test_file_prefixes_are_distinct() {
    assert_ne!(files::TIMELAPSE_PREFIX, files::PREVIEW_PREFIX);
    assert!(!files::TIMELAPSE_PREFIX.starts_with(files::PREVIEW_PREFIX));
    assert!(!files::PREVIEW_PREFIX.starts_with(files::TIMELAPSE_PREFIX));
}

#[test]
fn test_app_version_not_empty() {
    assert!(!constants::app_version().is_empty());
}
