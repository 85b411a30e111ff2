//! The scheduler seam: submit, status, remove.

use std::path::Path;

use async_trait::async_trait;

use recongrid_core::graph::WorkflowGraph;

/// Errors from driving the backend's tooling.
///
/// These are transport-level failures (could not run the tool at all). A
/// tool that ran and reported a non-zero exit is *not* an error here — it
/// comes back as a [`CommandReport`] for the caller to interpret, because
/// "submit failed, retry later" and "workflow already gone" are routine.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("work dir I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan serialisation failed: {0}")]
    Plan(#[from] serde_json::Error),
}

/// Exit status plus combined stdout/stderr of one backend command.
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub exit_code: i32,
    pub output: String,
}

impl CommandReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// What the lifecycle components require of the execution backend.
///
/// Mock implementations stand in for the real CLI in tests; a changed
/// backend means a new implementor, not new call sites.
#[async_trait]
pub trait GridScheduler: Send + Sync {
    /// Plan and submit a workflow graph. The report's text carries the
    /// execution handle on success (see [`crate::report::extract_handle`]).
    async fn submit(
        &self,
        graph: &WorkflowGraph,
        work_dir: &Path,
        output_dir: &Path,
    ) -> Result<CommandReport, SchedulerError>;

    /// Ask the backend for the status of the workflow rooted at `work_dir`.
    async fn status(&self, work_dir: &Path) -> Result<CommandReport, SchedulerError>;

    /// Ask the backend to remove the workflow rooted at `work_dir`.
    async fn remove(&self, work_dir: &Path) -> Result<CommandReport, SchedulerError>;
}
