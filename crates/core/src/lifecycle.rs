//! Job lifecycle states and the transition table.
//!
//! States are stored as TEXT in the `jobs.state` column; this module is the
//! single place that knows which strings exist and which moves between them
//! are legal. Every component that mutates a job goes through
//! [`state_machine::validate_transition`] rather than comparing strings.

use serde::{Deserialize, Serialize};

/// The closed set of job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Input received, not yet eligible for claiming.
    Uploaded,
    /// Eligible for the next coordinator pass.
    Queued,
    /// Graph submitted, an active run exists.
    Running,
    /// Terminal success of the latest run.
    Completed,
    /// The backend reported the run failed.
    Failed,
    /// Structurally broken: graph validation failed or inputs were purged
    /// before the job was ever claimed.
    Error,
    /// An operator asked for removal; backend teardown pending.
    DeletePending,
    /// Backend work removed and artifacts deleted. Terminal.
    Deleted,
    /// Row retained for audit only; everything on disk is gone. Terminal.
    Purged,
}

impl JobState {
    /// The TEXT value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Uploaded => "UPLOADED",
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Error => "ERROR",
            JobState::DeletePending => "DELETE PENDING",
            JobState::Deleted => "DELETED",
            JobState::Purged => "PURGED",
        }
    }

    /// Every state, in declaration order. Used by the exhaustive
    /// transition-table tests.
    pub const ALL: [JobState; 9] = [
        JobState::Uploaded,
        JobState::Queued,
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Error,
        JobState::DeletePending,
        JobState::Deleted,
        JobState::Purged,
    ];
}

impl std::str::FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(JobState::Uploaded),
            "QUEUED" => Ok(JobState::Queued),
            "RUNNING" => Ok(JobState::Running),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            "ERROR" => Ok(JobState::Error),
            "DELETE PENDING" => Ok(JobState::DeletePending),
            "DELETED" => Ok(JobState::Deleted),
            "PURGED" => Ok(JobState::Purged),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state string in storage that no enum variant covers.
#[derive(Debug, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct UnknownState(pub String);

pub mod state_machine {
    //! Centralized transition validation.

    use super::JobState;
    use super::JobState::*;

    /// Returns the set of states reachable from `from`.
    ///
    /// `Deleted` and `Purged` are terminal: they return an empty slice and
    /// no component may move a job out of them.
    pub fn valid_transitions(from: JobState) -> &'static [JobState] {
        match from {
            // Enqueued by the upload front end; errored when its inputs
            // age out before a claim; operator delete.
            Uploaded => &[Queued, Error, DeletePending],
            // Claimed and submitted; errored on graph validation failure;
            // operator delete. A failed submission leaves Queued untouched.
            Queued => &[Running, Error, DeletePending],
            // Completion hooks and reconciliation; reset to Queued when a
            // run never obtained a backend handle; operator delete.
            Running => &[Completed, Failed, Queued, DeletePending],
            // Operator delete or the 30-day retention sweep.
            Completed => &[DeletePending, Deleted],
            Failed => &[DeletePending],
            // Aged out by the retention sweep.
            Error => &[Deleted],
            // Backend teardown confirmed.
            DeletePending => &[Deleted],
            // All artifacts verified gone.
            Deleted => &[Purged],
            Purged => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a descriptive error for
    /// invalid ones.
    pub fn validate_transition(from: JobState, to: JobState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("invalid transition: {from} -> {to}"))
        }
    }
}
