// SPDX-License-Identifier: GPL-3.0-only

//! Schedule model: when a run starts, how long it lasts, how fast it plays
//!
//! Input from the operator is never rejected. Anything missing or out of
//! range is replaced with a default so the station can always be configured.

use crate::constants::MOVIE_FRAMERATE;
use crate::constants::schedule::*;
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Above this the inter-frame delay would exceed a day
const MAX_ACCELERATION: f64 = 86_400.0 * MOVIE_FRAMERATE as f64;

/// A validated timelapse schedule
///
/// Fields are only reachable through [`ScheduleInterval::new`], and
/// deserialization goes through it as well, so a value of this type always
/// holds an in-range duration and acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "IntervalFields")]
pub struct ScheduleInterval {
    /// Absolute scheduled start
    start: DateTime<Local>,
    /// Run length in hours, `0 < h <= 24`
    duration_hours: f64,
    /// Real time divided by movie time, `> 1`
    acceleration: f64,
}

/// Unchecked wire form of a schedule
#[derive(Deserialize)]
struct IntervalFields {
    start: Option<DateTime<Local>>,
    duration_hours: f64,
    acceleration: f64,
}

impl From<IntervalFields> for ScheduleInterval {
    fn from(fields: IntervalFields) -> Self {
        Self::new(fields.start, fields.duration_hours, fields.acceleration)
    }
}

impl Default for ScheduleInterval {
    fn default() -> Self {
        Self::new(None, DEFAULT_DURATION_HOURS, DEFAULT_ACCELERATION)
    }
}

impl ScheduleInterval {
    /// Build a schedule, substituting defaults for invalid values
    ///
    /// - missing start → now
    /// - duration ≤ 0, > 24 h or not finite → 1 h
    /// - acceleration ≤ 1 or not finite → 240
    pub fn new(start: Option<DateTime<Local>>, duration_hours: f64, acceleration: f64) -> Self {
        let duration_hours = if duration_hours.is_finite()
            && duration_hours > 0.0
            && duration_hours <= MAX_DURATION_HOURS
        {
            duration_hours
        } else {
            warn!(
                duration_hours,
                default = DEFAULT_DURATION_HOURS,
                "Invalid timelapse duration, using default"
            );
            DEFAULT_DURATION_HOURS
        };

        let acceleration =
            if acceleration.is_finite() && acceleration > 1.0 && acceleration <= MAX_ACCELERATION {
                acceleration
            } else {
                warn!(
                    acceleration,
                    default = DEFAULT_ACCELERATION,
                    "Invalid acceleration factor, using default"
                );
                DEFAULT_ACCELERATION
            };

        Self {
            start: start.unwrap_or_else(Local::now),
            duration_hours,
            acceleration,
        }
    }

    /// Build a schedule from raw form input
    pub fn from_request(start: Option<&str>, duration_hours: Option<f64>, acceleration: Option<f64>) -> Self {
        let now = Local::now();
        let parsed = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let parsed = parse_start(raw, now);
                if parsed.is_none() {
                    warn!(start = raw, "Unparsable start time, starting now");
                }
                parsed
            }
            None => None,
        };

        Self::new(
            parsed.or(Some(now)),
            duration_hours.unwrap_or(DEFAULT_DURATION_HOURS),
            acceleration.unwrap_or(DEFAULT_ACCELERATION),
        )
    }

    /// Absolute scheduled start
    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_hours
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Time between two consecutive stills
    pub fn frame_delay(&self) -> Duration {
        Duration::from_secs_f64(self.acceleration / f64::from(MOVIE_FRAMERATE))
    }

    /// Run length
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_hours * 3600.0)
    }

    /// Time left until the scheduled start, `None` once it has been reached
    pub fn until_start(&self, now: DateTime<Local>) -> Option<Duration> {
        let remaining = self.start - now;
        if remaining > TimeDelta::zero() {
            remaining.to_std().ok()
        } else {
            None
        }
    }

    /// Number of stills a full run produces
    pub fn expected_frames(&self) -> u64 {
        (self.duration().as_secs_f64() / self.frame_delay().as_secs_f64()).ceil() as u64
    }
}

/// Parse an operator supplied start time
///
/// Accepts RFC 3339 timestamps, `HH:MM` and decimal hours (`21.5` is 21:30),
/// the latter two meaning today in local time.
pub fn parse_start(input: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let input = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Local));
    }

    let time = if let Ok(t) = NaiveTime::parse_from_str(input, "%H:%M") {
        t
    } else {
        let hours: f64 = input.parse().ok()?;
        if !(hours > 0.0 && hours < 24.0) {
            return None;
        }
        NaiveTime::from_num_seconds_from_midnight_opt((hours * 3600.0).round() as u32, 0)?
    };

    now.date_naive()
        .and_time(time)
        .and_local_timezone(Local)
        .earliest()
}
