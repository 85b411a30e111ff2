//! Job entity model.

use serde::Serialize;
use sqlx::FromRow;

use recongrid_core::lifecycle::{JobState, UnknownState};
use recongrid_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub owner: String,
    pub email: String,
    /// Subject identifier the uploaded volume belongs to.
    pub subject: String,
    /// Processing-tool version the job was submitted against.
    pub version: String,
    /// Topology variant name (see `recongrid_core::graph::Topology`).
    pub workflow: String,
    /// Cores for parallelisable stages: 2 or 8.
    pub core_tier: i16,
    /// Free-form options, custom topology only.
    pub options: Option<String>,
    pub state: String,
    pub purged: bool,
    /// Set once the purge warning email has gone out; exactly-once guard.
    pub warned_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Job {
    /// Decode the TEXT state column into the closed enum.
    pub fn state(&self) -> Result<JobState, UnknownState> {
        self.state.parse()
    }

    /// Job age relative to `now`.
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        now - self.created_at
    }
}

/// Insert payload for a new job row; the upload front end maps onto this.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner: String,
    pub email: String,
    pub subject: String,
    pub version: String,
    pub workflow: String,
    pub core_tier: i16,
    pub options: Option<String>,
}
