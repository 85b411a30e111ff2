//! CLI implementation of the scheduler seam.
//!
//! Drives the backend through its command-line tools, the way an operator
//! would: plan-and-submit with the serialised graph, status and remove
//! against the work directory. Commands run to completion; stdout and
//! stderr are captured together since the backend interleaves them.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use recongrid_core::graph::WorkflowGraph;

use crate::adapter::{CommandReport, GridScheduler, SchedulerError};

/// File name of the serialised plan written into the work directory.
const PLAN_FILE: &str = "workflow-plan.json";

/// Scheduler driven through external executables.
#[derive(Debug, Clone)]
pub struct CliScheduler {
    submit_cmd: PathBuf,
    status_cmd: PathBuf,
    remove_cmd: PathBuf,
}

impl CliScheduler {
    pub fn new(
        submit_cmd: impl Into<PathBuf>,
        status_cmd: impl Into<PathBuf>,
        remove_cmd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            submit_cmd: submit_cmd.into(),
            status_cmd: status_cmd.into(),
            remove_cmd: remove_cmd.into(),
        }
    }

    async fn run(&self, cmd: &Path, args: &[&str]) -> Result<CommandReport, SchedulerError> {
        let output = Command::new(cmd)
            .args(args)
            .output()
            .await
            .map_err(|source| SchedulerError::Spawn {
                command: cmd.display().to_string(),
                source,
            })?;
        Ok(report_from(output))
    }
}

fn report_from(output: Output) -> CommandReport {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    CommandReport {
        exit_code: output.status.code().unwrap_or(-1),
        output: text,
    }
}

#[async_trait]
impl GridScheduler for CliScheduler {
    async fn submit(
        &self,
        graph: &WorkflowGraph,
        work_dir: &Path,
        output_dir: &Path,
    ) -> Result<CommandReport, SchedulerError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let plan_path = work_dir.join(PLAN_FILE);
        let plan = serde_json::to_vec_pretty(graph)?;
        tokio::fs::write(&plan_path, plan).await?;

        tracing::debug!(
            plan = %plan_path.display(),
            work_dir = %work_dir.display(),
            "Submitting workflow plan",
        );
        let work = work_dir.to_string_lossy().into_owned();
        let output = output_dir.to_string_lossy().into_owned();
        let plan_arg = plan_path.to_string_lossy().into_owned();
        let report = self
            .run(
                &self.submit_cmd,
                &[
                    "--dir",
                    &work,
                    "--output-dir",
                    &output,
                    "--plan",
                    &plan_arg,
                    "--submit",
                ],
            )
            .await?;

        // The plan file has served its purpose either way; the backend
        // keeps its own copy in the handle-keyed scratch directory.
        if let Err(err) = tokio::fs::remove_file(&plan_path).await {
            tracing::warn!(error = %err, plan = %plan_path.display(), "Could not remove plan file");
        }
        Ok(report)
    }

    async fn status(&self, work_dir: &Path) -> Result<CommandReport, SchedulerError> {
        let dir = work_dir.to_string_lossy().into_owned();
        self.run(&self.status_cmd, &["-l", &dir]).await
    }

    async fn remove(&self, work_dir: &Path) -> Result<CommandReport, SchedulerError> {
        let dir = work_dir.to_string_lossy().into_owned();
        self.run(&self.remove_cmd, &[&dir]).await
    }
}
