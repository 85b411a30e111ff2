//! Repository for the `jobs` table.
//!
//! Every state mutation is a compare-and-set on the current state column,
//! validated against the central transition table first, so a concurrent
//! pass can never push a job through an illegal move — the losing writer
//! simply affects zero rows.

use sqlx::PgExecutor;

use recongrid_core::lifecycle::{state_machine, JobState};
use recongrid_core::types::{DbId, Timestamp};

use crate::models::job::{Job, NewJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner, email, subject, version, workflow, core_tier, options, \
    state, purged, warned_at, created_at";

/// A transition request the state machine rejects, or a storage failure.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// CRUD and lifecycle operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in the `UPLOADED` state.
    pub async fn create(exec: impl PgExecutor<'_>, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (owner, email, subject, version, workflow, core_tier, options) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.owner)
            .bind(&input.email)
            .bind(&input.subject)
            .bind(&input.version)
            .bind(&input.workflow)
            .bind(input.core_tier)
            .bind(&input.options)
            .fetch_one(exec)
            .await
    }

    pub async fn find_by_id(
        exec: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query).bind(id).fetch_optional(exec).await
    }

    /// All jobs currently in `state`, oldest first.
    pub async fn list_in_state(
        exec: impl PgExecutor<'_>,
        state: JobState,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE state = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(state.as_str())
            .fetch_all(exec)
            .await
    }

    /// Jobs in `state` created at or before `cutoff`, oldest first.
    pub async fn list_in_state_older_than(
        exec: impl PgExecutor<'_>,
        state: JobState,
        cutoff: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state = $1 AND created_at <= $2 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(state.as_str())
            .bind(cutoff)
            .fetch_all(exec)
            .await
    }

    /// Jobs whose uploaded inputs are due for purging: older than the
    /// cutoff and not already failed, errored, or torn down.
    pub async fn list_input_purge_due(
        exec: impl PgExecutor<'_>,
        cutoff: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE created_at <= $1 \
               AND state NOT IN ('FAILED', 'ERROR', 'DELETE PENDING', 'DELETED', 'PURGED') \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query).bind(cutoff).fetch_all(exec).await
    }

    /// Completed or errored jobs inside the warning band that have not
    /// been warned yet. `band_start` is the younger edge (exclusive),
    /// `band_end` the older edge (inclusive).
    pub async fn list_warning_due(
        exec: impl PgExecutor<'_>,
        band_start: Timestamp,
        band_end: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state IN ('COMPLETED', 'ERROR') \
               AND warned_at IS NULL \
               AND created_at <= $1 AND created_at > $2 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(band_start)
            .bind(band_end)
            .fetch_all(exec)
            .await
    }

    /// Completed or errored jobs old enough for result purging.
    pub async fn list_result_purge_due(
        exec: impl PgExecutor<'_>,
        cutoff: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state IN ('COMPLETED', 'ERROR') AND created_at <= $1 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query).bind(cutoff).fetch_all(exec).await
    }

    /// Deleted jobs whose artifacts are all purged; candidates for the
    /// terminal `PURGED` state.
    pub async fn list_purge_candidates(exec: impl PgExecutor<'_>) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state = 'DELETED' AND NOT purged \
               AND NOT EXISTS (\
                   SELECT 1 FROM input_files \
                   WHERE input_files.job_id = jobs.id AND NOT input_files.purged\
               ) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query).fetch_all(exec).await
    }

    /// Number of jobs currently running; the admission-control input.
    pub async fn count_running(exec: impl PgExecutor<'_>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = 'RUNNING'")
            .fetch_one(exec)
            .await
    }

    /// Move a job from `from` to `to`.
    ///
    /// Validates against the transition table, then compare-and-sets on
    /// the state column. Returns `false` when the row was not in `from`
    /// anymore (lost race, stale caller) — that is not an error.
    pub async fn transition(
        exec: impl PgExecutor<'_>,
        id: DbId,
        from: JobState,
        to: JobState,
    ) -> Result<bool, TransitionError> {
        state_machine::validate_transition(from, to).map_err(TransitionError::Invalid)?;
        let result = sqlx::query("UPDATE jobs SET state = $3 WHERE id = $1 AND state = $2")
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(exec)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that the purge warning went out.
    pub async fn mark_warned(exec: impl PgExecutor<'_>, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET warned_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Terminal step: everything on disk is gone, keep the row for audit.
    pub async fn mark_purged(exec: impl PgExecutor<'_>, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'PURGED', purged = TRUE \
             WHERE id = $1 AND state = 'DELETED'",
        )
        .bind(id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
