//! Time-based retention policy.
//!
//! The sweeps in the worker crate decide *which* jobs to touch with these
//! predicates; the policy itself is three ages and a warning band.

use chrono::Duration;

/// Inputs are removed once a job is this old.
pub const INPUT_PURGE_DAYS: i64 = 21;

/// Start of the deletion-warning band (inclusive), in days.
pub const WARN_WINDOW_START_DAYS: i64 = 22;

/// End of the deletion-warning band (exclusive), in days.
pub const WARN_WINDOW_END_DAYS: i64 = 23;

/// Results are removed once a job is this old.
pub const RESULT_PURGE_DAYS: i64 = 30;

/// Whether a job's uploaded inputs are due for purging.
pub fn input_purge_due(age: Duration) -> bool {
    age >= Duration::days(INPUT_PURGE_DAYS)
}

/// Whether a job sits in the deletion-warning band.
///
/// The band is a fixed 24-hour window; exactly-once delivery across
/// irregular sweep cadences is handled by the `warned_at` column, not by
/// this predicate.
pub fn warning_due(age: Duration) -> bool {
    age >= Duration::days(WARN_WINDOW_START_DAYS) && age < Duration::days(WARN_WINDOW_END_DAYS)
}

/// Whether a job's results are due for purging.
pub fn result_purge_due(age: Duration) -> bool {
    age >= Duration::days(RESULT_PURGE_DAYS)
}
