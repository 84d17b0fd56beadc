// SPDX-License-Identifier: GPL-3.0-only

//! Staging and output file management
//!
//! Staging holds transient stills: `timelapse_<run>_<counter>.jpg` for runs and
//! `preview_<timestamp>.jpg` for previews. The output directory holds one
//! finished `timelapse_<run>.mp4` per completed run.

use crate::constants::files::*;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Run identifier for a run starting at `start`
pub fn run_id(start: DateTime<Local>) -> String {
    start.format(RUN_ID_FORMAT).to_string()
}

/// `base`, or `base-2`, `base-3`, … if `base` is already taken
pub fn unique_run_id(base: String, taken: &[String]) -> String {
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

/// File name of frame `index` of run `run_id`
pub fn frame_file_name(run_id: &str, index: u64) -> String {
    format!(
        "{TIMELAPSE_PREFIX}_{run_id}_{index:0width$}.{FRAME_EXTENSION}",
        width = FRAME_COUNTER_WIDTH
    )
}

/// Glob matching all frames of `run_id` and nothing else
pub fn frame_glob(run_id: &str) -> String {
    format!(
        "{TIMELAPSE_PREFIX}_{run_id}_{}.{FRAME_EXTENSION}",
        "[0-9]".repeat(FRAME_COUNTER_WIDTH)
    )
}

/// Final movie file name of `run_id`
pub fn movie_file_name(run_id: &str) -> String {
    format!("{TIMELAPSE_PREFIX}_{run_id}.{MOVIE_EXTENSION}")
}

/// Hidden file the encoder renders into before the movie is promoted
pub fn partial_movie_file_name(run_id: &str) -> String {
    format!(".{TIMELAPSE_PREFIX}_{run_id}.{MOVIE_EXTENSION}.part")
}

/// Preview still name for a capture taken at `at`
pub fn preview_file_name(at: DateTime<Local>) -> String {
    format!(
        "{PREVIEW_PREFIX}_{}.{FRAME_EXTENSION}",
        at.format("%Y-%m-%d-%H-%M-%S-%3f")
    )
}

/// Create `dir` and its parents
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Remove stale timelapse and preview stills from the staging directory
///
/// Frames belonging to any run in `keep` (runs whose movie is still being
/// assembled) are left alone. Returns the number of files removed.
pub fn purge_stale(staging: &Path, keep: &[String]) -> io::Result<usize> {
    let entries = match std::fs::read_dir(staging) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        let stale_timelapse = name
            .strip_prefix(TIMELAPSE_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| !keep.iter().any(|id| rest.starts_with(&format!("{id}_"))));
        let stale_preview = name.starts_with(PREVIEW_PREFIX);
        if !(stale_timelapse || stale_preview) {
            continue;
        }

        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(file = name, error = %e, "Failed to remove stale staging file"),
        }
    }

    if removed > 0 {
        info!(removed, dir = %staging.display(), "Purged stale staging files");
    }
    Ok(removed)
}

/// Number of frames staged for `run_id`
pub fn count_frames(staging: &Path, run_id: &str) -> usize {
    let prefix = format!("{TIMELAPSE_PREFIX}_{run_id}_");
    std::fs::read_dir(staging)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    e.file_name().to_str().is_some_and(|n| {
                        n.starts_with(&prefix) && n.ends_with(&format!(".{FRAME_EXTENSION}"))
                    })
                })
                .count()
        })
        .unwrap_or(0)
}

/// Most recently finished movie in `output_dir`
///
/// Partial renders are hidden files and never returned.
pub fn latest_movie(output_dir: &Path) -> Option<PathBuf> {
    let mut movies: Vec<_> = std::fs::read_dir(output_dir)
        .ok()?
        .flatten()
        .filter(|e| {
            e.file_name().to_str().is_some_and(|n| {
                n.starts_with(TIMELAPSE_PREFIX) && n.ends_with(&format!(".{MOVIE_EXTENSION}"))
            })
        })
        .collect();

    // newest first
    movies.sort_by_key(|e| {
        e.metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(std::cmp::Reverse)
    });

    let latest = movies.first()?.path();
    debug!(path = %latest.display(), "Latest movie");
    Some(latest)
}
