//! Lifecycle tests over a live database with a mock execution backend.
//!
//! Each test gets a fresh database with the db crate's migrations applied
//! and a throwaway data tree under a tempdir.

use std::path::Path;

use async_trait::async_trait;
use sqlx::PgPool;

use recongrid_core::graph::WorkflowGraph;
use recongrid_core::layout::DataLayout;
use recongrid_core::lifecycle::JobState;
use recongrid_db::models::NewJob;
use recongrid_db::repositories::{InputFileRepo, JobRepo, JobRunRepo};
use recongrid_grid::{CommandReport, GridScheduler, SchedulerError};
use recongrid_worker::coordinator::Coordinator;
use recongrid_worker::hooks;
use recongrid_worker::reconcile::Reconciler;
use recongrid_worker::retention::RetentionSweep;

const HANDLE: &str = "T20260807-120455";

/// Canned-response double for the backend CLI.
struct MockScheduler {
    /// Exit code the submit tool reports.
    submit_exit: i32,
    /// Whether the submit report carries a recognisable handle line.
    with_handle: bool,
    status_exit: i32,
    status_output: String,
}

impl MockScheduler {
    fn submitting() -> Self {
        Self {
            submit_exit: 0,
            with_handle: true,
            status_exit: 0,
            status_output: "Summary: 1 DAG total (Running:1)\n".to_string(),
        }
    }

    fn with_status(output: &str) -> Self {
        Self {
            status_output: output.to_string(),
            ..Self::submitting()
        }
    }
}

#[async_trait]
impl GridScheduler for MockScheduler {
    async fn submit(
        &self,
        _graph: &WorkflowGraph,
        work_dir: &Path,
        _output_dir: &Path,
    ) -> Result<CommandReport, SchedulerError> {
        if self.submit_exit != 0 {
            return Ok(CommandReport {
                exit_code: self.submit_exit,
                output: "ERROR: site not reachable\n".to_string(),
            });
        }
        let output = if self.with_handle {
            format!(
                "Your workflow has been started and is running in the base directory:\n\
                 \x20 {}/{HANDLE}\n",
                work_dir.display()
            )
        } else {
            "Submitted, no further details.\n".to_string()
        };
        Ok(CommandReport {
            exit_code: 0,
            output,
        })
    }

    async fn status(&self, _work_dir: &Path) -> Result<CommandReport, SchedulerError> {
        Ok(CommandReport {
            exit_code: self.status_exit,
            output: self.status_output.clone(),
        })
    }

    async fn remove(&self, _work_dir: &Path) -> Result<CommandReport, SchedulerError> {
        Ok(CommandReport {
            exit_code: 0,
            output: "Job 12.0 marked for removal\nworkflow not found\n".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn coordinator(pool: &PgPool, scheduler: MockScheduler, layout: &DataLayout) -> Coordinator<MockScheduler> {
    Coordinator::new(
        pool.clone(),
        scheduler,
        layout.clone(),
        20,
        "/usr/bin/task-completed".to_string(),
        "/usr/bin/run-completed".to_string(),
    )
}

async fn queued_job(pool: &PgPool, layout: &DataLayout, subject: &str) -> recongrid_db::models::Job {
    let job = JobRepo::create(
        pool,
        &NewJob {
            owner: "fred".to_string(),
            email: "fred@example.org".to_string(),
            subject: subject.to_string(),
            version: "6.0.1".to_string(),
            workflow: "diamond".to_string(),
            core_tier: 8,
            options: None,
        },
    )
    .await
    .unwrap();

    let filename = format!("{subject}_defaced.mgz");
    let input_path = layout.input_file("fred", &filename);
    InputFileRepo::create(
        pool,
        job.id,
        &input_path.to_string_lossy(),
        &filename,
        false,
    )
    .await
    .unwrap();

    JobRepo::transition(pool, job.id, JobState::Uploaded, JobState::Queued)
        .await
        .unwrap();
    job
}

async fn force_state(pool: &PgPool, job_id: i64, state: JobState) {
    sqlx::query("UPDATE jobs SET state = $2 WHERE id = $1")
        .bind(job_id)
        .bind(state.as_str())
        .execute(pool)
        .await
        .unwrap();
}

async fn age_job(pool: &PgPool, job_id: i64, days: f64) {
    sqlx::query("UPDATE jobs SET created_at = NOW() - $2 * INTERVAL '1 day' WHERE id = $1")
        .bind(job_id)
        .bind(days)
        .execute(pool)
        .await
        .unwrap();
}

async fn job_state(pool: &PgPool, job_id: i64) -> JobState {
    JobRepo::find_by_id(pool, job_id)
        .await
        .unwrap()
        .unwrap()
        .state()
        .unwrap()
}

fn write_usage_records(layout: &DataLayout, handle: &str) {
    let scratch = layout.scratch_dir("fred", handle);
    std::fs::create_dir_all(&scratch).unwrap();
    for (name, start, duration, cores) in [
        ("autorecon1", 1_000.0, 600.0, 1u32),
        ("autorecon2-lh", 1_600.0, 1_200.0, 8),
        ("autorecon2-rh", 1_600.0, 1_000.0, 8),
        ("autorecon3", 2_800.0, 400.0, 1),
    ] {
        let body = serde_json::json!({
            "start": start, "duration": duration, "utime": duration, "cores": cores,
        });
        std::fs::write(scratch.join(format!("{name}.usage.json")), body.to_string()).unwrap();
    }
}

fn write_backend_results(layout: &DataLayout, handle: &str, subject: &str) {
    let out = layout.handle_output_dir("fred", handle);
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join(format!("{subject}_output.tar.bz2")), b"tarball").unwrap();
    std::fs::write(out.join("recon-all.log"), b"log").unwrap();
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn diamond_job_runs_to_completion(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;

    // Claim: QUEUED -> RUNNING with a four-task run.
    let stats = coordinator(&pool, MockScheduler::submitting(), &layout)
        .run_pass()
        .await
        .unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Running);

    let run = JobRunRepo::active_for_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(run.tasks, 4);
    assert_eq!(run.tasks_completed, 0);
    assert_eq!(run.backend_handle.as_deref(), Some(HANDLE));

    // Four per-task hooks (plus two duplicates) fill the counter.
    for _ in 0..6 {
        hooks::task_completed(&pool, run.id).await.unwrap();
    }
    let run = JobRunRepo::find_by_id(&pool, run.id).await.unwrap().unwrap();
    assert_eq!(run.tasks_completed, 4);

    // Success hook: RUNNING -> COMPLETED with accounting and staged results.
    write_usage_records(&layout, HANDLE);
    write_backend_results(&layout, HANDLE, "S1");
    hooks::run_completed(&pool, &layout, None, run.id, true).await.unwrap();

    assert_eq!(job_state(&pool, job.id).await, JobState::Completed);
    let run = JobRunRepo::find_by_id(&pool, run.id).await.unwrap().unwrap();
    assert!(run.ended_at.is_some());
    assert_eq!(run.walltime, Some(2_200.0));
    assert!(run.cputime.unwrap() > 0.0);
    assert!(layout.result_tarball("fred", job.id, "S1").is_file());
    assert!(layout.result_log("fred", job.id).is_file());

    // A duplicate completion hook is a no-op.
    hooks::run_completed(&pool, &layout, None, run.id, false).await.unwrap();
    assert_eq!(job_state(&pool, job.id).await, JobState::Completed);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn admission_ceiling_blocks_claims(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());

    for subject in ["R1", "R2"] {
        let running = queued_job(&pool, &layout, subject).await;
        force_state(&pool, running.id, JobState::Running).await;
    }
    let waiting = queued_job(&pool, &layout, "S1").await;

    let coordinator = Coordinator::new(
        pool.clone(),
        MockScheduler::submitting(),
        layout.clone(),
        2,
        "/usr/bin/task-completed".to_string(),
        "/usr/bin/run-completed".to_string(),
    );
    let stats = coordinator.run_pass().await.unwrap();
    assert_eq!(stats.claimed, 0);
    assert_eq!(job_state(&pool, waiting.id).await, JobState::Queued);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_submission_leaves_job_queued(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;

    let scheduler = MockScheduler {
        submit_exit: 1,
        ..MockScheduler::submitting()
    };
    let stats = coordinator(&pool, scheduler, &layout).run_pass().await.unwrap();
    assert_eq!(stats.retried, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Queued);
    // The run row rolled back with the rest of the job's transaction.
    assert!(JobRunRepo::active_for_job(&pool, job.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn invalid_request_moves_job_to_error(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;
    // A subject directory under a diamond request is structurally broken.
    sqlx::query("UPDATE input_files SET is_subject_dir = TRUE WHERE job_id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let stats = coordinator(&pool, MockScheduler::submitting(), &layout)
        .run_pass()
        .await
        .unwrap();
    assert_eq!(stats.errored, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Error);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn handleless_run_is_reset_to_queued(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;

    let scheduler = MockScheduler {
        with_handle: false,
        ..MockScheduler::submitting()
    };
    coordinator(&pool, scheduler, &layout).run_pass().await.unwrap();
    assert_eq!(job_state(&pool, job.id).await, JobState::Running);
    age_job(&pool, job.id, 2.0).await;

    let reconciler = Reconciler::new(
        pool.clone(),
        MockScheduler::submitting(),
        layout.clone(),
        None,
    );
    let stats = reconciler.run_pass().await.unwrap();
    assert_eq!(stats.reset, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Queued);
    assert!(JobRunRepo::active_for_job(&pool, job.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failure_marker_applies_failure_path(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;

    coordinator(&pool, MockScheduler::submitting(), &layout)
        .run_pass()
        .await
        .unwrap();
    age_job(&pool, job.id, 2.0).await;

    let reconciler = Reconciler::new(
        pool.clone(),
        MockScheduler::with_status("STAT\nSummary: 1 DAG total (Failure:1)\n"),
        layout.clone(),
        None,
    );
    let stats = reconciler.run_pass().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Failed);
    let run = JobRunRepo::latest_handle_for_job(&pool, job.id).await.unwrap();
    assert_eq!(run.as_deref(), Some(HANDLE));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn fresh_running_jobs_are_left_alone(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = queued_job(&pool, &layout, "S1").await;

    let scheduler = MockScheduler {
        with_handle: false,
        ..MockScheduler::submitting()
    };
    coordinator(&pool, scheduler, &layout).run_pass().await.unwrap();

    // Younger than a day: reconciliation must not touch it.
    let reconciler = Reconciler::new(
        pool.clone(),
        MockScheduler::submitting(),
        layout.clone(),
        None,
    );
    let stats = reconciler.run_pass().await.unwrap();
    assert_eq!(stats.examined, 0);
    assert_eq!(job_state(&pool, job.id).await, JobState::Running);
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

async fn completed_aged_job(
    pool: &PgPool,
    layout: &DataLayout,
    subject: &str,
    days: f64,
) -> recongrid_db::models::Job {
    let job = queued_job(pool, layout, subject).await;
    coordinator(pool, MockScheduler::submitting(), layout)
        .run_pass()
        .await
        .unwrap();
    let run = JobRunRepo::active_for_job(pool, job.id).await.unwrap().unwrap();
    write_backend_results(layout, HANDLE, subject);
    hooks::run_completed(pool, layout, None, run.id, true).await.unwrap();
    age_job(pool, job.id, days).await;

    // The uploaded input is still on disk at this point.
    let input = layout.input_file("fred", &format!("{subject}_defaced.mgz"));
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    std::fs::write(&input, b"volume").unwrap();
    job
}

fn sweep(pool: &PgPool, layout: &DataLayout, dry_run: bool) -> RetentionSweep<MockScheduler> {
    RetentionSweep::new(
        pool.clone(),
        MockScheduler::submitting(),
        layout.clone(),
        None,
        dry_run,
    )
}

#[sqlx::test(migrations = "../db/migrations")]
async fn result_purge_is_idempotent(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = completed_aged_job(&pool, &layout, "S1", 31.0).await;

    let first = sweep(&pool, &layout, false).purge_results().await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Deleted);
    assert!(!layout.result_tarball("fred", job.id, "S1").exists());
    assert!(!layout.result_log("fred", job.id).exists());
    assert!(!layout.handle_output_dir("fred", HANDLE).exists());
    assert!(!layout.input_file("fred", "S1_defaced.mgz").exists());

    // Second sweep: nothing eligible, nothing fails, state unchanged.
    let second = sweep(&pool, &layout, false).purge_results().await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(job_state(&pool, job.id).await, JobState::Deleted);

    // With every artifact purged the job can retire for good.
    let purged = sweep(&pool, &layout, false).mark_purged().await.unwrap();
    assert_eq!(purged, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Purged);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn dry_run_touches_nothing(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = completed_aged_job(&pool, &layout, "S1", 31.0).await;

    sweep(&pool, &layout, true).purge_results().await.unwrap();

    assert_eq!(job_state(&pool, job.id).await, JobState::Completed);
    assert!(layout.result_tarball("fred", job.id, "S1").is_file());
    assert!(layout.input_file("fred", "S1_defaced.mgz").is_file());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn input_purge_errors_never_claimed_jobs(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());

    let job = JobRepo::create(
        &pool,
        &NewJob {
            owner: "fred".to_string(),
            email: "fred@example.org".to_string(),
            subject: "S1".to_string(),
            version: "6.0.1".to_string(),
            workflow: "diamond".to_string(),
            core_tier: 8,
            options: None,
        },
    )
    .await
    .unwrap();
    let input = layout.input_file("fred", "S1_defaced.mgz");
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    std::fs::write(&input, b"volume").unwrap();
    InputFileRepo::create(&pool, job.id, &input.to_string_lossy(), "S1_defaced.mgz", false)
        .await
        .unwrap();
    age_job(&pool, job.id, 22.0).await;

    let swept = sweep(&pool, &layout, false).purge_inputs().await.unwrap();
    assert_eq!(swept, 1);
    assert!(!input.exists());
    assert_eq!(job_state(&pool, job.id).await, JobState::Error);

    // Running it again converges without error.
    sweep(&pool, &layout, false).purge_inputs().await.unwrap();
    assert_eq!(job_state(&pool, job.id).await, JobState::Error);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn delete_pending_tears_down_and_retires(pool: PgPool) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let job = completed_aged_job(&pool, &layout, "S1", 5.0).await;
    force_state(&pool, job.id, JobState::DeletePending).await;

    // The mock's status reports "not found", so teardown confirms on the
    // first poll.
    let teardown = RetentionSweep::new(
        pool.clone(),
        MockScheduler::with_status("workflow not found\n"),
        layout.clone(),
        None,
        false,
    );
    let swept = teardown.delete_pending().await.unwrap();
    assert_eq!(swept, 1);
    assert_eq!(job_state(&pool, job.id).await, JobState::Deleted);
    assert!(!layout.scratch_dir("fred", HANDLE).exists());
    assert!(!layout.handle_output_dir("fred", HANDLE).exists());
    assert!(!layout.result_tarball("fred", job.id, "S1").exists());
}
