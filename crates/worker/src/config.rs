//! Pass configuration from the environment.

use std::path::PathBuf;

use recongrid_core::layout::DataLayout;
use recongrid_grid::CliScheduler;

/// Default admission ceiling: jobs allowed in `RUNNING` at once.
const DEFAULT_MAX_RUNNING: i64 = 20;

/// Default shared data base directory.
const DEFAULT_DATA_DIR: &str = "/srv/recongrid";

/// Default directory for pass lock files.
const DEFAULT_LOCK_DIR: &str = "/var/lock/recongrid";

/// Default backend tool paths.
const DEFAULT_SUBMIT_CMD: &str = "/usr/bin/pegasus-plan";
const DEFAULT_STATUS_CMD: &str = "/usr/bin/pegasus-status";
const DEFAULT_REMOVE_CMD: &str = "/usr/bin/pegasus-remove";

/// Default hook entry points registered on submitted graphs.
const DEFAULT_TASK_HOOK_CMD: &str = "/usr/bin/task-completed";
const DEFAULT_RUN_HOOK_CMD: &str = "/usr/bin/run-completed";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {0} is not a number")]
    NotANumber(&'static str),
}

/// Everything a pass binary needs, resolved once at startup.
///
/// | Variable           | Required | Default                    |
/// |--------------------|----------|----------------------------|
/// | `DATABASE_URL`     | yes      | —                          |
/// | `RECON_DATA_DIR`   | no       | `/srv/recongrid`           |
/// | `RECON_LOCK_DIR`   | no       | `/var/lock/recongrid`      |
/// | `MAX_RUNNING_JOBS` | no       | `20`                       |
/// | `GRID_SUBMIT_CMD`  | no       | `/usr/bin/pegasus-plan`    |
/// | `GRID_STATUS_CMD`  | no       | `/usr/bin/pegasus-status`  |
/// | `GRID_REMOVE_CMD`  | no       | `/usr/bin/pegasus-remove`  |
/// | `TASK_HOOK_CMD`    | no       | `/usr/bin/task-completed`  |
/// | `RUN_HOOK_CMD`     | no       | `/usr/bin/run-completed`   |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub layout: DataLayout,
    pub lock_dir: PathBuf,
    pub max_running: i64,
    pub submit_cmd: PathBuf,
    pub status_cmd: PathBuf,
    pub remove_cmd: PathBuf,
    pub task_hook_cmd: String,
    pub run_hook_cmd: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let max_running = match std::env::var("MAX_RUNNING_JOBS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::NotANumber("MAX_RUNNING_JOBS"))?,
            Err(_) => DEFAULT_MAX_RUNNING,
        };
        Ok(Self {
            database_url,
            layout: DataLayout::new(var_or("RECON_DATA_DIR", DEFAULT_DATA_DIR)),
            lock_dir: var_or("RECON_LOCK_DIR", DEFAULT_LOCK_DIR).into(),
            max_running,
            submit_cmd: var_or("GRID_SUBMIT_CMD", DEFAULT_SUBMIT_CMD).into(),
            status_cmd: var_or("GRID_STATUS_CMD", DEFAULT_STATUS_CMD).into(),
            remove_cmd: var_or("GRID_REMOVE_CMD", DEFAULT_REMOVE_CMD).into(),
            task_hook_cmd: var_or("TASK_HOOK_CMD", DEFAULT_TASK_HOOK_CMD),
            run_hook_cmd: var_or("RUN_HOOK_CMD", DEFAULT_RUN_HOOK_CMD),
        })
    }

    /// The scheduler driven through the configured backend tools.
    pub fn scheduler(&self) -> CliScheduler {
        CliScheduler::new(&self.submit_cmd, &self.status_cmd, &self.remove_cmd)
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
