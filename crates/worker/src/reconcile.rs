//! Drift reconciliation: local state vs. the backend's view.
//!
//! Completion hooks are fired by the backend and can be lost. This pass
//! audits every job that has been `RUNNING` for more than a day and heals
//! the two failure shapes: runs that never obtained an execution handle
//! (reset and resubmit) and runs whose terminal report the hooks missed
//! (apply the same completion path the hook would have).

use chrono::Utc;
use sqlx::PgPool;

use recongrid_core::layout::DataLayout;
use recongrid_core::lifecycle::JobState;
use recongrid_db::models::Job;
use recongrid_db::repositories::{JobRepo, JobRunRepo};
use recongrid_events::EmailDelivery;
use recongrid_grid::report::{self, StatusOutcome};
use recongrid_grid::GridScheduler;

use crate::hooks;

/// Jobs younger than this are left alone; the hooks may simply not have
/// fired yet.
const MIN_AGE_DAYS: i64 = 1;

/// Counters for one reconciliation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileStats {
    pub examined: usize,
    pub reset: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Reconciler<S> {
    pool: PgPool,
    scheduler: S,
    layout: DataLayout,
    mailer: Option<EmailDelivery>,
}

impl<S: GridScheduler> Reconciler<S> {
    pub fn new(
        pool: PgPool,
        scheduler: S,
        layout: DataLayout,
        mailer: Option<EmailDelivery>,
    ) -> Self {
        Self {
            pool,
            scheduler,
            layout,
            mailer,
        }
    }

    /// One pass over the stale `RUNNING` jobs.
    pub async fn run_pass(&self) -> anyhow::Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        let cutoff = Utc::now() - chrono::Duration::days(MIN_AGE_DAYS);
        let jobs = JobRepo::list_in_state_older_than(&self.pool, JobState::Running, cutoff).await?;

        for job in jobs {
            stats.examined += 1;
            if let Err(err) = self.reconcile_job(&job, &mut stats).await {
                tracing::error!(job_id = job.id, error = %err, "Reconciliation failed for job");
            }
        }

        tracing::info!(
            examined = stats.examined,
            reset = stats.reset,
            completed = stats.completed,
            failed = stats.failed,
            "Reconciliation pass finished",
        );
        Ok(stats)
    }

    async fn reconcile_job(&self, job: &Job, stats: &mut ReconcileStats) -> anyhow::Result<()> {
        let run = JobRunRepo::active_for_job(&self.pool, job.id).await?;

        let handle = match run.as_ref().and_then(|r| r.backend_handle.clone()) {
            Some(handle) => handle,
            None => {
                // Stuck: running with no way to ask the backend about it.
                self.reset_job(job).await?;
                stats.reset += 1;
                return Ok(());
            }
        };

        let work_dir = self.layout.scratch_dir(&job.owner, &handle);
        let status = match self.scheduler.status(&work_dir).await {
            Ok(report) => report,
            Err(err) => {
                // An unreachable backend is never evidence of job failure.
                tracing::warn!(job_id = job.id, error = %err, "Status query failed; leaving job untouched");
                return Ok(());
            }
        };

        let run_id = run.map(|r| r.id).unwrap_or_default();
        match report::status_outcome(&status.output) {
            StatusOutcome::Failure => {
                tracing::warn!(job_id = job.id, handle = %handle, "Backend reports failure; applying failure path");
                hooks::run_completed(&self.pool, &self.layout, self.mailer.as_ref(), run_id, false)
                    .await?;
                stats.failed += 1;
            }
            StatusOutcome::Success => {
                tracing::info!(job_id = job.id, handle = %handle, "Backend reports success; applying success path");
                hooks::run_completed(&self.pool, &self.layout, self.mailer.as_ref(), run_id, true)
                    .await?;
                stats.completed += 1;
            }
            StatusOutcome::Indeterminate => {
                tracing::debug!(job_id = job.id, handle = %handle, "Workflow still in flight");
            }
        }
        Ok(())
    }

    /// Drop the job's runs and put it back in the queue for resubmission.
    async fn reset_job(&self, job: &Job) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let dropped = JobRunRepo::delete_for_job(&mut *tx, job.id).await?;
        let moved = JobRepo::transition(&mut *tx, job.id, JobState::Running, JobState::Queued).await?;
        if !moved {
            tx.rollback().await?;
            tracing::warn!(job_id = job.id, "Job left RUNNING before reset; skipping");
            return Ok(());
        }
        tx.commit().await?;
        tracing::warn!(job_id = job.id, dropped_runs = dropped, "Reset handle-less job to QUEUED");
        Ok(())
    }
}
