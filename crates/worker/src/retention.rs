//! Retention sweeps: warn, purge, and retire aged jobs.
//!
//! Five independent stages, each idempotent — a re-run after a partial
//! failure converges instead of erroring, and files that are already gone
//! count as removed. Every stage honours `dry_run`: destructive
//! filesystem calls become log lines and each job's transaction is rolled
//! back instead of committed, while all query and branch logic still runs.

use std::path::Path;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use recongrid_core::layout::DataLayout;
use recongrid_core::lifecycle::JobState;
use recongrid_core::retention::{
    INPUT_PURGE_DAYS, RESULT_PURGE_DAYS, WARN_WINDOW_END_DAYS, WARN_WINDOW_START_DAYS,
};
use recongrid_db::models::Job;
use recongrid_db::repositories::{InputFileRepo, JobRepo, JobRunRepo};
use recongrid_events::{warning_body, warning_subject, EmailDelivery};
use recongrid_grid::{report, GridScheduler};

/// Seconds between teardown-confirmation polls in the admin-delete stage.
const DELETE_POLL_INTERVAL_SECS: u64 = 10;

/// Attempt ceiling for teardown confirmation before the job is left in
/// `DELETE PENDING` for the next pass.
const DELETE_POLL_ATTEMPTS: u32 = 30;

/// Jobs advanced by one stage invocation.
pub type SweptCount = usize;

pub struct RetentionSweep<S> {
    pool: PgPool,
    scheduler: S,
    layout: DataLayout,
    mailer: Option<EmailDelivery>,
    dry_run: bool,
}

impl<S: GridScheduler> RetentionSweep<S> {
    pub fn new(
        pool: PgPool,
        scheduler: S,
        layout: DataLayout,
        mailer: Option<EmailDelivery>,
        dry_run: bool,
    ) -> Self {
        if dry_run {
            tracing::info!("Dry run: no files will be removed and no changes committed");
        }
        Self {
            pool,
            scheduler,
            layout,
            mailer,
            dry_run,
        }
    }

    // -----------------------------------------------------------------------
    // Stage: input purge
    // -----------------------------------------------------------------------

    /// Remove uploaded inputs for jobs past the input-retention age and
    /// mark never-claimed jobs as errored.
    pub async fn purge_inputs(&self) -> anyhow::Result<SweptCount> {
        let cutoff = Utc::now() - Duration::days(INPUT_PURGE_DAYS);
        let jobs = JobRepo::list_input_purge_due(&self.pool, cutoff).await?;
        let mut swept = 0;

        for job in jobs {
            if let Err(err) = self.purge_inputs_for(&job).await {
                tracing::error!(job_id = job.id, error = %err, "Input purge failed for job");
                continue;
            }
            swept += 1;
        }
        Ok(swept)
    }

    async fn purge_inputs_for(&self, job: &Job) -> anyhow::Result<()> {
        tracing::info!(job_id = job.id, owner = %job.owner, state = %job.state, "Purging inputs");
        let mut tx = self.pool.begin().await?;

        let inputs = InputFileRepo::unpurged_for_job(&mut *tx, job.id).await?;
        let mut containing_dir = None;
        for input in &inputs {
            let path = Path::new(&input.path);
            containing_dir = path.parent().map(Path::to_path_buf);
            if self.remove_file(path) {
                InputFileRepo::mark_purged(&mut *tx, input.id).await?;
            }
        }
        if let Some(dir) = containing_dir {
            self.remove_empty_dir(&dir);
        }

        // A job its owner never enqueued has lost its inputs for good.
        if job.state().ok() == Some(JobState::Uploaded) {
            JobRepo::transition(&mut *tx, job.id, JobState::Uploaded, JobState::Error).await?;
            tracing::info!(job_id = job.id, "Never-claimed job moved to ERROR");
        }

        self.finish(tx).await
    }

    // -----------------------------------------------------------------------
    // Stage: deletion warning
    // -----------------------------------------------------------------------

    /// Send the one-week deletion warning to owners of jobs inside the
    /// warning band. Exactly-once via the `warned_at` column.
    pub async fn warn_purge(&self) -> anyhow::Result<SweptCount> {
        let now = Utc::now();
        let band_start = now - Duration::days(WARN_WINDOW_START_DAYS);
        let band_end = now - Duration::days(WARN_WINDOW_END_DAYS);
        let jobs = JobRepo::list_warning_due(&self.pool, band_start, band_end).await?;
        let mut swept = 0;

        for job in jobs {
            if self.dry_run {
                tracing::info!(job_id = job.id, email = %job.email, "Would send deletion warning");
                continue;
            }
            let Some(mailer) = self.mailer.as_ref() else {
                tracing::warn!(job_id = job.id, "Email disabled; cannot send deletion warning");
                continue;
            };
            match mailer
                .deliver(&job.email, &warning_subject(job.id), &warning_body(job.id))
                .await
            {
                Ok(()) => {
                    JobRepo::mark_warned(&self.pool, job.id).await?;
                    swept += 1;
                }
                Err(err) => {
                    // Not marked; the next sweep inside the band retries.
                    tracing::error!(job_id = job.id, error = %err, "Deletion warning failed");
                }
            }
        }
        Ok(swept)
    }

    // -----------------------------------------------------------------------
    // Stage: result purge
    // -----------------------------------------------------------------------

    /// Remove results for completed/errored jobs past the result-retention
    /// age and advance them to `DELETED`.
    pub async fn purge_results(&self) -> anyhow::Result<SweptCount> {
        let cutoff = Utc::now() - Duration::days(RESULT_PURGE_DAYS);
        let jobs = JobRepo::list_result_purge_due(&self.pool, cutoff).await?;
        let mut swept = 0;

        for job in jobs {
            match self.purge_results_for(&job).await {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(job_id = job.id, error = %err, "Result purge failed for job");
                }
            }
        }
        Ok(swept)
    }

    async fn purge_results_for(&self, job: &Job) -> anyhow::Result<bool> {
        let from = match job.state() {
            Ok(state @ (JobState::Completed | JobState::Error)) => state,
            _ => return Ok(false),
        };
        tracing::info!(job_id = job.id, owner = %job.owner, "Purging results");

        let mut tx = self.pool.begin().await?;
        let mut clean = true;

        clean &= self.remove_file(&self.layout.result_tarball(&job.owner, job.id, &job.subject));
        clean &= self.remove_file(&self.layout.result_log(&job.owner, job.id));

        for input in InputFileRepo::unpurged_for_job(&mut *tx, job.id).await? {
            if self.remove_file(Path::new(&input.path)) {
                InputFileRepo::mark_purged(&mut *tx, input.id).await?;
            } else {
                clean = false;
            }
        }

        if let Some(handle) = JobRunRepo::latest_handle_for_job(&mut *tx, job.id).await? {
            clean &= self.remove_tree(&self.layout.handle_output_dir(&job.owner, &handle));
        }

        // Advance only when every removal succeeded (missing files count
        // as removed); anything else stays put for the next sweep.
        if clean {
            JobRepo::transition(&mut *tx, job.id, from, JobState::Deleted).await?;
            tracing::info!(job_id = job.id, "Job moved to DELETED");
        } else {
            tracing::warn!(job_id = job.id, "Partial purge; job left for the next sweep");
        }
        self.finish(tx).await?;
        Ok(clean)
    }

    // -----------------------------------------------------------------------
    // Stage: explicit admin delete
    // -----------------------------------------------------------------------

    /// Tear down jobs an operator marked `DELETE PENDING`: backend removal
    /// first, local files only after the backend confirms.
    pub async fn delete_pending(&self) -> anyhow::Result<SweptCount> {
        let jobs = JobRepo::list_in_state(&self.pool, JobState::DeletePending).await?;
        let mut swept = 0;

        for job in jobs {
            match self.delete_one(&job).await {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(job_id = job.id, error = %err, "Delete failed for job");
                }
            }
        }
        Ok(swept)
    }

    async fn delete_one(&self, job: &Job) -> anyhow::Result<bool> {
        tracing::info!(job_id = job.id, owner = %job.owner, "Deleting workflow");
        let handle = JobRunRepo::latest_handle_for_job(&self.pool, job.id).await?;

        if let Some(handle) = handle.as_deref() {
            let scratch = self.layout.scratch_dir(&job.owner, handle);
            if self.dry_run {
                tracing::info!(job_id = job.id, dir = %scratch.display(), "Would request backend removal");
            } else {
                let removal = match self.scheduler.remove(&scratch).await {
                    Ok(report) => report,
                    Err(err) => {
                        // Backend unreachable; never delete under it blind.
                        tracing::warn!(job_id = job.id, error = %err, "Backend removal failed; retrying next pass");
                        return Ok(false);
                    }
                };
                if !report::remove_confirms_absence(removal.exit_code, &removal.output) {
                    tracing::warn!(
                        job_id = job.id,
                        exit_code = removal.exit_code,
                        "Backend refused removal; retrying next pass",
                    );
                    return Ok(false);
                }
                if !self.await_teardown(&scratch).await {
                    tracing::warn!(job_id = job.id, "Backend still tearing down; retrying next pass");
                    return Ok(false);
                }
            }
            self.remove_tree(&scratch);
            self.remove_tree(&self.layout.handle_output_dir(&job.owner, handle));
        }

        let mut tx = self.pool.begin().await?;
        for input in InputFileRepo::unpurged_for_job(&mut *tx, job.id).await? {
            if self.remove_file(Path::new(&input.path)) {
                InputFileRepo::mark_purged(&mut *tx, input.id).await?;
            }
        }
        self.remove_file(&self.layout.result_tarball(&job.owner, job.id, &job.subject));
        self.remove_file(&self.layout.result_log(&job.owner, job.id));

        JobRepo::transition(&mut *tx, job.id, JobState::DeletePending, JobState::Deleted).await?;
        tracing::info!(job_id = job.id, "Job moved to DELETED");
        self.finish(tx).await?;
        Ok(true)
    }

    /// Poll the backend until it forgets the workflow, with a bounded
    /// number of attempts. Returns `false` when the ceiling is exhausted
    /// or a status query fails — the caller leaves the job for the next
    /// pass instead of deleting files the backend may still be writing.
    async fn await_teardown(&self, scratch: &Path) -> bool {
        for attempt in 1..=DELETE_POLL_ATTEMPTS {
            match self.scheduler.status(scratch).await {
                Ok(status) if !report::workflow_tracked(status.exit_code, &status.output) => {
                    return true;
                }
                Ok(_) => {
                    tracing::debug!(attempt, dir = %scratch.display(), "Backend still tracks workflow");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Teardown status query failed");
                    return false;
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(DELETE_POLL_INTERVAL_SECS)).await;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Stage: terminal purge
    // -----------------------------------------------------------------------

    /// Advance `DELETED` jobs whose artifacts are all purged to the
    /// terminal `PURGED` state.
    pub async fn mark_purged(&self) -> anyhow::Result<SweptCount> {
        let jobs = JobRepo::list_purge_candidates(&self.pool).await?;
        let mut swept = 0;

        for job in jobs {
            if self.dry_run {
                tracing::info!(job_id = job.id, "Would mark job PURGED");
                continue;
            }
            if JobRepo::mark_purged(&self.pool, job.id).await? {
                tracing::info!(job_id = job.id, "Job moved to PURGED");
                swept += 1;
            }
        }
        Ok(swept)
    }

    // -----------------------------------------------------------------------
    // Filesystem helpers
    // -----------------------------------------------------------------------

    /// Remove one file. Returns `true` when the file is gone afterwards —
    /// including when it was never there, which keeps re-runs idempotent.
    fn remove_file(&self, path: &Path) -> bool {
        if !path.exists() {
            return true;
        }
        if self.dry_run {
            tracing::info!(path = %path.display(), "Would delete file");
            return true;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Deleted file");
                true
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Cannot delete file");
                false
            }
        }
    }

    /// Remove a directory tree. Missing trees count as removed.
    fn remove_tree(&self, path: &Path) -> bool {
        if !path.exists() {
            return true;
        }
        if self.dry_run {
            tracing::info!(path = %path.display(), "Would delete directory tree");
            return true;
        }
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Deleted directory tree");
                true
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Cannot delete directory tree");
                false
            }
        }
    }

    /// Remove the now-empty directory that contained a job's inputs.
    /// Leftover contents are logged, not fatal.
    fn remove_empty_dir(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        if self.dry_run {
            tracing::info!(path = %path.display(), "Would remove directory");
            return;
        }
        if let Err(err) = std::fs::remove_dir(path) {
            tracing::warn!(path = %path.display(), error = %err, "Cannot remove input directory");
        }
    }

    /// Commit the job's transaction, or roll it back in dry-run mode.
    async fn finish(&self, tx: sqlx::Transaction<'_, sqlx::Postgres>) -> anyhow::Result<()> {
        if self.dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }
        Ok(())
    }
}
