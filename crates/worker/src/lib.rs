//! Batch passes over the job store: claiming, reconciling, and retiring.
//!
//! Each pass is a short-lived cron invocation, not a server loop. A pass
//! acquires an exclusive lease, walks its slice of the job table with one
//! transaction per job, and exits; the completion hooks in [`hooks`] are
//! invoked out of process by the execution backend.

pub mod config;
pub mod coordinator;
pub mod hooks;
pub mod reconcile;
pub mod retention;

use recongrid_core::lease::{LeaseError, PassLease};

use crate::config::WorkerConfig;

/// Install the tracing subscriber for a pass binary.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = if debug {
        "recongrid_worker=debug,recongrid_grid=debug"
    } else {
        "recongrid_worker=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Acquire the exclusive lease for a pass.
///
/// Returns `Ok(None)` when another instance holds it — the caller must
/// exit cleanly without side effects. Any other failure is unrecoverable
/// for the pass.
pub fn acquire_lease(config: &WorkerConfig, name: &str) -> anyhow::Result<Option<PassLease>> {
    match PassLease::acquire(&config.lock_dir, name) {
        Ok(lease) => Ok(Some(lease)),
        Err(LeaseError::AlreadyHeld(path)) => {
            tracing::warn!(lock = %path, "Another {name} pass is running; exiting");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
