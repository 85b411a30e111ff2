//! Coordinator pass: claim queued jobs and submit their graphs.

use clap::Parser;

use recongrid_worker::config::WorkerConfig;
use recongrid_worker::coordinator::Coordinator;

#[derive(Parser)]
#[command(version, about = "Generate and submit workflows for queued jobs")]
struct Args {
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
    let Some(_lease) = recongrid_worker::acquire_lease(&config, "process-jobs")? else {
        return Ok(());
    };

    let pool = recongrid_db::connect(&config.database_url).await?;
    recongrid_db::health_check(&pool).await?;

    let coordinator = Coordinator::new(
        pool,
        config.scheduler(),
        config.layout.clone(),
        config.max_running,
        config.task_hook_cmd.clone(),
        config.run_hook_cmd.clone(),
    );
    coordinator.run_pass().await?;
    Ok(())
}
