//! Per-graph completion hook, invoked by the backend once per run.
//!
//! `--success` and `--failure` select the terminal state; exactly one
//! must be given. No lease — this is not a batch pass, and duplicate
//! delivery is handled by the compare-and-set transition inside.

use clap::Parser;

use recongrid_core::types::DbId;
use recongrid_events::{EmailConfig, EmailDelivery};
use recongrid_worker::config::WorkerConfig;
use recongrid_worker::hooks;

#[derive(Parser)]
#[command(version, about = "Record the completion of a whole job run")]
struct Args {
    /// Job run id that finished.
    #[arg(long)]
    id: DbId,
    /// The run completed successfully.
    #[arg(long, conflicts_with = "failure")]
    success: bool,
    /// The run completed with errors or was removed.
    #[arg(long)]
    failure: bool,
    /// Output debug messages.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    recongrid_worker::init_tracing(args.debug);
    anyhow::ensure!(
        args.success || args.failure,
        "one of --success or --failure is required"
    );

    let config = WorkerConfig::from_env()?;
    let pool = recongrid_db::connect(&config.database_url).await?;
    let mailer = EmailConfig::from_env().map(EmailDelivery::new);

    hooks::run_completed(&pool, &config.layout, mailer.as_ref(), args.id, args.success).await?;
    Ok(())
}
