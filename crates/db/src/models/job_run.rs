//! Job run entity model: one submission attempt of a job's graph.

use serde::Serialize;
use sqlx::FromRow;

use recongrid_core::types::{DbId, Timestamp};

/// A row from the `job_run` table.
///
/// The completed counter is monotonic, never exceeds `tasks`, and at most
/// one run per job has no `ended_at` (the active run) — all three enforced
/// in the schema, not just here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRun {
    pub id: DbId,
    pub job_id: DbId,
    /// Opaque execution handle parsed from the backend's submit report.
    /// `None` means submission never yielded a handle; reconciliation
    /// resets such runs.
    pub backend_handle: Option<String>,
    /// Expected task total: the node count of the submitted graph.
    pub tasks: i32,
    pub tasks_completed: i32,
    /// Wall-clock seconds for the whole run, from the usage records.
    pub walltime: Option<f64>,
    /// Core-seconds for the whole run, from the usage records.
    pub cputime: Option<f64>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl JobRun {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}
