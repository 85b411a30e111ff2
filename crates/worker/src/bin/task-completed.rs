//! Per-task completion hook, invoked by the backend after each task.
//!
//! Hooks run concurrently and may be delivered more than once; all the
//! safety lives in the single clamped update this wraps. No lease — this
//! is not a batch pass.

use clap::Parser;

use recongrid_core::types::DbId;
use recongrid_worker::config::WorkerConfig;
use recongrid_worker::hooks;

#[derive(Parser)]
#[command(version, about = "Record one completed task for a job run")]
struct Args {
    /// Job run id the finished task belongs to.
    #[arg(long)]
    id: DbId,
    /// Output debug messages.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    recongrid_worker::init_tracing(args.debug);

    let config = WorkerConfig::from_env()?;
    let pool = recongrid_db::connect(&config.database_url).await?;
    hooks::task_completed(&pool, args.id).await?;
    Ok(())
}
