//! The claim pass: queued jobs become running backend workflows.
//!
//! For each claimed job, everything persisted — the run row, its handle,
//! the state transition — lives in one transaction. A submission failure
//! rolls that job back (it stays queued for the next pass) without
//! touching the rest of the pass.

use sqlx::PgPool;

use recongrid_core::graph::builder::{self, GraphRequest, InputArtifact};
use recongrid_core::graph::Topology;
use recongrid_core::layout::DataLayout;
use recongrid_core::lifecycle::JobState;
use recongrid_db::models::Job;
use recongrid_db::repositories::{InputFileRepo, JobRepo, JobRunRepo};
use recongrid_grid::{report, GridScheduler};

/// What happened to one queued job during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Graph submitted; the job is now running.
    Submitted,
    /// Structural validation failed; the job moved to `ERROR`.
    Invalid,
    /// Transient submission failure; the job stays queued.
    Retry,
}

/// Counters for one coordinator pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub claimed: usize,
    pub errored: usize,
    pub retried: usize,
}

pub struct Coordinator<S> {
    pool: PgPool,
    scheduler: S,
    layout: DataLayout,
    max_running: i64,
    task_hook_cmd: String,
    run_hook_cmd: String,
}

impl<S: GridScheduler> Coordinator<S> {
    pub fn new(
        pool: PgPool,
        scheduler: S,
        layout: DataLayout,
        max_running: i64,
        task_hook_cmd: String,
        run_hook_cmd: String,
    ) -> Self {
        Self {
            pool,
            scheduler,
            layout,
            max_running,
            task_hook_cmd,
            run_hook_cmd,
        }
    }

    /// One pass: claim queued jobs up to the admission ceiling.
    pub async fn run_pass(&self) -> anyhow::Result<PassStats> {
        let mut stats = PassStats::default();

        let running = JobRepo::count_running(&self.pool).await?;
        if running >= self.max_running {
            tracing::info!(running, ceiling = self.max_running, "At admission ceiling; claiming nothing");
            return Ok(stats);
        }
        let mut slots = self.max_running - running;

        let queued = JobRepo::list_in_state(&self.pool, JobState::Queued).await?;
        for job in queued {
            if slots == 0 {
                break;
            }
            match self.claim(&job).await {
                Ok(ClaimOutcome::Submitted) => {
                    stats.claimed += 1;
                    slots -= 1;
                }
                Ok(ClaimOutcome::Invalid) => stats.errored += 1,
                Ok(ClaimOutcome::Retry) => stats.retried += 1,
                Err(err) => {
                    // This job's transaction already rolled back; the pass
                    // moves on to the next one.
                    tracing::error!(job_id = job.id, error = %err, "Claim failed");
                    stats.retried += 1;
                }
            }
        }

        tracing::info!(
            claimed = stats.claimed,
            errored = stats.errored,
            retried = stats.retried,
            "Coordinator pass finished",
        );
        Ok(stats)
    }

    /// Claim one queued job: build its graph, submit it, persist the run.
    async fn claim(&self, job: &Job) -> anyhow::Result<ClaimOutcome> {
        tracing::info!(job_id = job.id, owner = %job.owner, subject = %job.subject, "Claiming job");

        let topology: Topology = match job.workflow.parse() {
            Ok(topology) => topology,
            Err(err) => return self.invalidate(job, &err.to_string()).await,
        };
        let inputs = InputFileRepo::for_job(&self.pool, job.id).await?;
        let artifacts: Vec<InputArtifact> = inputs.iter().map(|f| f.as_artifact()).collect();

        let mut tx = self.pool.begin().await?;

        // The run row is created first so the hook command lines can name
        // its id; a failed submission rolls it back below.
        let run = JobRunRepo::create(&mut *tx, job.id, 0).await?;
        let task_hook = format!("{} --id {}", self.task_hook_cmd, run.id);
        let on_success = format!("{} --success --id {}", self.run_hook_cmd, run.id);
        let on_failure = format!("{} --failure --id {}", self.run_hook_cmd, run.id);

        let request = GraphRequest {
            subject: &job.subject,
            version: &job.version,
            topology,
            core_tier: job.core_tier as u32,
            options: job.options.as_deref(),
            inputs: &artifacts,
            task_hook: Some(&task_hook),
            on_success: Some(&on_success),
            on_failure: Some(&on_failure),
        };
        let graph = match builder::build(&request) {
            Ok(graph) => graph,
            Err(err) => {
                tx.rollback().await?;
                return self.invalidate(job, &err.to_string()).await;
            }
        };
        JobRunRepo::set_tasks(&mut *tx, run.id, graph.task_count() as i32).await?;

        let work_dir = self.layout.workflows_dir(&job.owner);
        let output_dir = self.layout.output_dir(&job.owner);
        let submit = self.scheduler.submit(&graph, &work_dir, &output_dir).await;
        let report = match submit {
            Ok(report) => report,
            Err(err) => {
                tx.rollback().await?;
                tracing::error!(job_id = job.id, error = %err, "Backend submission errored; job stays queued");
                return Ok(ClaimOutcome::Retry);
            }
        };
        if !report.succeeded() {
            tx.rollback().await?;
            tracing::error!(
                job_id = job.id,
                exit_code = report.exit_code,
                "Backend rejected submission; job stays queued",
            );
            return Ok(ClaimOutcome::Retry);
        }

        match report::extract_handle(&report.output, &work_dir) {
            Some(handle) => {
                tracing::info!(job_id = job.id, handle = %handle, "Workflow started");
                JobRunRepo::set_handle(&mut *tx, run.id, &handle).await?;
            }
            // No recognisable handle: record the run without one and let
            // reconciliation reset it if the backend never surfaces.
            None => tracing::warn!(job_id = job.id, "Submit report carried no execution handle"),
        }

        let moved = JobRepo::transition(&mut *tx, job.id, JobState::Queued, JobState::Running).await?;
        if !moved {
            // Someone else moved the job mid-claim (operator delete);
            // drop everything we did.
            tx.rollback().await?;
            tracing::warn!(job_id = job.id, "Job left QUEUED during claim; rolled back");
            return Ok(ClaimOutcome::Retry);
        }
        tx.commit().await?;
        Ok(ClaimOutcome::Submitted)
    }

    /// Validation failed: the job is structurally broken, not retryable.
    async fn invalidate(&self, job: &Job, reason: &str) -> anyhow::Result<ClaimOutcome> {
        tracing::error!(job_id = job.id, reason, "Graph validation failed; marking job ERROR");
        JobRepo::transition(&self.pool, job.id, JobState::Queued, JobState::Error).await?;
        Ok(ClaimOutcome::Invalid)
    }
}
