//! Retention pass: tear down jobs an operator marked for deletion.

use clap::Parser;

use recongrid_worker::config::WorkerConfig;
use recongrid_worker::retention::RetentionSweep;

#[derive(Parser)]
#[command(version, about = "Delete workflows in the DELETE PENDING state")]
struct Args {
    /// Mock actions instead of carrying them out.
    #[arg(long)]
    dry_run: bool,
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
    let Some(_lease) = recongrid_worker::acquire_lease(&config, "delete-jobs")? else {
        return Ok(());
    };

    let pool = recongrid_db::connect(&config.database_url).await?;
    recongrid_db::health_check(&pool).await?;

    let sweep = RetentionSweep::new(
        pool,
        config.scheduler(),
        config.layout.clone(),
        None,
        args.dry_run,
    );
    let swept = sweep.delete_pending().await?;
    let purged = sweep.mark_purged().await?;
    tracing::info!(swept, purged, "Delete pass finished");
    Ok(())
}
