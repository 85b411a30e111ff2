//! Accounting totals from the backend's per-task usage records.
//!
//! Each finished task leaves a `<task>.usage.json` record in the run's
//! scratch directory: start (epoch seconds), duration (seconds), utime
//! (cpu seconds), and the core count the task ran with. Walltime is the
//! span from the earliest start to the latest end; cputime charges each
//! task's duration once per core.

use std::path::Path;

use serde::Deserialize;

/// Suffix of per-task usage records in a scratch directory.
const USAGE_SUFFIX: &str = ".usage.json";

/// One task's usage record as the backend writes it.
#[derive(Debug, Deserialize)]
pub struct UsageRecord {
    /// Task start, seconds since the epoch.
    pub start: f64,
    /// Wall-clock seconds the task ran.
    pub duration: f64,
    /// CPU seconds reported by the task wrapper.
    pub utime: f64,
    /// Cores the task was scheduled with.
    pub cores: u32,
}

/// Aggregated accounting for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageTotals {
    /// Wall-clock seconds across the whole run.
    pub walltime: f64,
    /// Core seconds across the whole run.
    pub cputime: f64,
}

/// Walk `scratch_dir` and aggregate every readable usage record.
///
/// Unreadable or malformed records are logged and skipped; a run with no
/// valid records (or a non-positive span) yields `None`, and the caller
/// records the run without accounting rather than failing the completion.
pub fn calculate_usage(scratch_dir: &Path) -> Option<UsageTotals> {
    let entries = match std::fs::read_dir(scratch_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(
                dir = %scratch_dir.display(),
                error = %err,
                "Cannot read scratch directory for usage records",
            );
            return None;
        }
    };

    let mut start = f64::INFINITY;
    let mut end = f64::NEG_INFINITY;
    let mut core_time = 0.0;

    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(USAGE_SUFFIX) {
            continue;
        }
        let path = entry.path();
        let record: UsageRecord = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(record) => record,
            Err(err) => {
                tracing::info!(file = %path.display(), error = %err, "Skipping unreadable usage record");
                continue;
            }
        };

        start = start.min(record.start);
        end = end.max(record.start + record.duration);
        core_time += f64::from(record.cores) * record.duration;
    }

    let walltime = end - start;
    if walltime > 0.0 && core_time > 0.0 {
        Some(UsageTotals {
            walltime,
            cputime: core_time,
        })
    } else {
        None
    }
}
