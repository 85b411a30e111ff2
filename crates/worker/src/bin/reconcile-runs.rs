//! Reconciliation pass: audit stale running jobs against the backend.

use clap::Parser;

use recongrid_events::{EmailConfig, EmailDelivery};
use recongrid_worker::config::WorkerConfig;
use recongrid_worker::reconcile::Reconciler;

#[derive(Parser)]
#[command(version, about = "Resync running workflows with the backend's state")]
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
    let Some(_lease) = recongrid_worker::acquire_lease(&config, "reconcile-runs")? else {
        return Ok(());
    };

    let pool = recongrid_db::connect(&config.database_url).await?;
    recongrid_db::health_check(&pool).await?;

    let mailer = EmailConfig::from_env().map(EmailDelivery::new);
    let reconciler = Reconciler::new(pool, config.scheduler(), config.layout.clone(), mailer);
    reconciler.run_pass().await?;
    Ok(())
}
