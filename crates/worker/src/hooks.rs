//! Completion-hook handling.
//!
//! The backend invokes these out of process: once per finished task and
//! once when the whole graph succeeds or fails. Deliveries can race, drop,
//! duplicate, or arrive for jobs that were purged long ago, so both entry
//! points are no-ops whenever the rows they expect are missing and both
//! tolerate being applied twice.

use std::path::Path;

use chrono::SecondsFormat;
use sqlx::PgPool;

use recongrid_core::layout::DataLayout;
use recongrid_core::lifecycle::JobState;
use recongrid_core::types::DbId;
use recongrid_db::models::{Job, JobRun};
use recongrid_db::repositories::{JobRepo, JobRunRepo};
use recongrid_events::{
    completion_body, completion_subject, CompletionNotice, EmailDelivery,
};
use recongrid_grid::usage;

/// Per-task completion: one clamped increment on the run's counter.
///
/// Returns whether a counter slot was consumed; `false` covers duplicate
/// deliveries and runs that no longer exist, both of which are normal.
pub async fn task_completed(pool: &PgPool, run_id: DbId) -> anyhow::Result<bool> {
    let applied = JobRunRepo::increment_completed(pool, run_id).await?;
    if applied {
        tracing::info!(run_id, "Task completion recorded");
    } else {
        tracing::info!(run_id, "Task completion ignored (run gone or counter full)");
    }
    Ok(applied)
}

/// Per-graph completion: close the run, advance the job, stage results,
/// and notify the owner.
///
/// The database work is one transaction; result copying is best effort
/// (a missing artifact is logged and the state still advances) and the
/// email goes out only after the commit.
pub async fn run_completed(
    pool: &PgPool,
    layout: &DataLayout,
    mailer: Option<&EmailDelivery>,
    run_id: DbId,
    success: bool,
) -> anyhow::Result<()> {
    let Some(run) = JobRunRepo::find_by_id(pool, run_id).await? else {
        tracing::warn!(run_id, "Completion hook for unknown run; ignoring");
        return Ok(());
    };
    let Some(job) = JobRepo::find_by_id(pool, run.job_id).await? else {
        tracing::warn!(run_id, job_id = run.job_id, "Completion hook for missing job; ignoring");
        return Ok(());
    };

    let totals = run
        .backend_handle
        .as_deref()
        .and_then(|handle| usage::calculate_usage(&layout.scratch_dir(&job.owner, handle)));
    let (walltime, cputime) = match totals {
        Some(t) => (Some(t.walltime), Some(t.cputime)),
        None => (None, None),
    };

    let mut tx = pool.begin().await?;
    let target = if success { JobState::Completed } else { JobState::Failed };
    let moved = JobRepo::transition(&mut *tx, job.id, JobState::Running, target).await?;
    if !moved {
        // Reconciliation or a duplicate hook got here first.
        tx.rollback().await?;
        tracing::info!(job_id = job.id, run_id, "Job already left RUNNING; hook ignored");
        return Ok(());
    }
    JobRunRepo::close(&mut *tx, run.id, walltime, cputime, success).await?;
    stage_results(layout, &job, &run, success);
    tx.commit().await?;

    if success {
        tracing::info!(job_id = job.id, run_id, "Job completed");
    } else {
        tracing::warn!(job_id = job.id, run_id, "Job failed");
    }

    if let Some(mailer) = mailer {
        let notice = CompletionNotice {
            job_id: job.id,
            submitted: job.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            success,
            walltime,
            cputime,
        };
        if let Err(err) = mailer
            .deliver(&job.email, &completion_subject(job.id), &completion_body(&notice))
            .await
        {
            // A notification failure never rolls back a completion.
            tracing::error!(job_id = job.id, error = %err, "Could not email completion notice");
        }
    }

    Ok(())
}

/// Copy the terminal artifact and the log into the owner's results
/// directory. Missing sources are logged and skipped; result availability
/// is tracked by the API layer, not by the state machine.
fn stage_results(layout: &DataLayout, job: &Job, run: &JobRun, success: bool) {
    let Some(handle) = run.backend_handle.as_deref() else {
        tracing::warn!(job_id = job.id, "No execution handle; nothing to stage");
        return;
    };

    let copies = [
        (
            layout.backend_result_tarball(&job.owner, handle, &job.subject),
            layout.result_tarball(&job.owner, job.id, &job.subject),
        ),
        (
            layout.backend_log(&job.owner, handle),
            layout.result_log(&job.owner, job.id),
        ),
    ];
    for (source, dest) in copies {
        stage_one(&source, &dest, job.id, success);
    }
}

fn stage_one(source: &Path, dest: &Path, job_id: DbId, success: bool) {
    if !source.is_file() {
        if success {
            tracing::error!(job_id, source = %source.display(), "Expected result artifact missing");
        } else {
            tracing::info!(job_id, source = %source.display(), "No artifact from failed run");
        }
        return;
    }
    if let Some(parent) = dest.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::error!(job_id, error = %err, "Cannot create results directory");
            return;
        }
    }
    match std::fs::copy(source, dest) {
        Ok(_) => {
            tracing::info!(job_id, source = %source.display(), dest = %dest.display(), "Staged result");
        }
        Err(err) => {
            tracing::error!(job_id, source = %source.display(), error = %err, "Copy failed");
        }
    }
}
