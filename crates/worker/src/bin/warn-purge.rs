//! Retention pass: warn owners a week before their results are purged.

use clap::Parser;

use recongrid_events::{EmailConfig, EmailDelivery};
use recongrid_worker::config::WorkerConfig;
use recongrid_worker::retention::RetentionSweep;

#[derive(Parser)]
#[command(version, about = "Warn users about results that will be deleted")]
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
    let Some(_lease) = recongrid_worker::acquire_lease(&config, "warn-purge")? else {
        return Ok(());
    };

    let pool = recongrid_db::connect(&config.database_url).await?;
    recongrid_db::health_check(&pool).await?;

    let mailer = EmailConfig::from_env().map(EmailDelivery::new);
    let sweep = RetentionSweep::new(
        pool,
        config.scheduler(),
        config.layout.clone(),
        mailer,
        args.dry_run,
    );
    let swept = sweep.warn_purge().await?;
    tracing::info!(swept, "Deletion warnings finished");
    Ok(())
}
