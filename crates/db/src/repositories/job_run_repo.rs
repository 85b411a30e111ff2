//! Repository for the `job_run` table.
//!
//! Completion hooks arrive out of process, concurrently, and sometimes
//! more than once, so every mutation here is a single guarded statement:
//! the guard makes duplicates and stragglers affect zero rows instead of
//! corrupting the counters.

use sqlx::PgExecutor;

use recongrid_core::types::DbId;

use crate::models::job_run::JobRun;

/// Column list for `job_run` queries.
const COLUMNS: &str = "\
    id, job_id, backend_handle, tasks, tasks_completed, walltime, cputime, \
    started_at, ended_at";

/// Operations on job runs.
pub struct JobRunRepo;

impl JobRunRepo {
    /// Open a run for a freshly submitted graph. The schema's partial
    /// unique index rejects a second open run for the same job.
    pub async fn create(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
        tasks: i32,
    ) -> Result<JobRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_run (job_id, tasks) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRun>(&query)
            .bind(job_id)
            .bind(tasks)
            .fetch_one(exec)
            .await
    }

    pub async fn find_by_id(
        exec: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<JobRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_run WHERE id = $1");
        sqlx::query_as::<_, JobRun>(&query).bind(id).fetch_optional(exec).await
    }

    /// The job's run without an `ended_at`, if any.
    pub async fn active_for_job(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
    ) -> Result<Option<JobRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_run WHERE job_id = $1 AND ended_at IS NULL"
        );
        sqlx::query_as::<_, JobRun>(&query)
            .bind(job_id)
            .fetch_optional(exec)
            .await
    }

    /// Record the expected task total once the graph is built. Only valid
    /// while the run is open and nothing has completed yet.
    pub async fn set_tasks(
        exec: impl PgExecutor<'_>,
        id: DbId,
        tasks: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE job_run SET tasks = $2 \
             WHERE id = $1 AND ended_at IS NULL AND tasks_completed = 0",
        )
        .bind(id)
        .bind(tasks)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Attach the backend execution handle parsed from the submit report.
    pub async fn set_handle(
        exec: impl PgExecutor<'_>,
        id: DbId,
        handle: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE job_run SET backend_handle = $2 WHERE id = $1")
            .bind(id)
            .bind(handle)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Per-task completion: one clamped increment.
    ///
    /// Returns `false` when nothing changed — the row is gone (job already
    /// purged) or the counter is full (duplicate delivery). Both are
    /// expected and must stay silent no-ops.
    pub async fn increment_completed(
        exec: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_run SET tasks_completed = tasks_completed + 1 \
             WHERE id = $1 AND tasks_completed < tasks",
        )
        .bind(id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close a run with its accounting totals. A successful run also
    /// completes the counter (stragglers after close affect zero rows).
    pub async fn close(
        exec: impl PgExecutor<'_>,
        id: DbId,
        walltime: Option<f64>,
        cputime: Option<f64>,
        success: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_run \
             SET ended_at = NOW(), walltime = $2, cputime = $3, \
                 tasks_completed = CASE WHEN $4 THEN tasks ELSE tasks_completed END \
             WHERE id = $1 AND ended_at IS NULL",
        )
        .bind(id)
        .bind(walltime)
        .bind(cputime)
        .bind(success)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recent execution handle recorded for a job, if any run ever
    /// obtained one. The retention sweeps key the backend's scratch and
    /// output directories off this.
    pub async fn latest_handle_for_job(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT backend_handle FROM job_run \
             WHERE job_id = $1 AND backend_handle IS NOT NULL \
             ORDER BY started_at DESC \
             LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(exec)
        .await
    }

    /// Drop all runs for a job. Used by the reconciliation reset so the
    /// job can be claimed and resubmitted cleanly.
    pub async fn delete_for_job(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM job_run WHERE job_id = $1")
            .bind(job_id)
            .execute(exec)
            .await?;
        Ok(result.rows_affected())
    }
}
