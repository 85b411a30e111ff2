//! Exclusive lease for one batch pass.
//!
//! Each pass acquires a lease at start; if another instance already holds
//! it the pass must exit without side effects. The lease is a lock file
//! created with `create_new` so acquisition is atomic, and it is released
//! on every exit path via `Drop`. The holder's pid is written into the
//! file for operators chasing a wedged pass.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// Another instance of this pass is running.
    #[error("pass lease already held: {0}")]
    AlreadyHeld(String),

    #[error("lease I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A held lease. Dropping it releases the lock file.
#[derive(Debug)]
pub struct PassLease {
    path: PathBuf,
}

impl PassLease {
    /// Acquire `<dir>/<name>.lock`, failing fast if it already exists.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self, LeaseError> {
        let path = dir.join(format!("{name}.lock"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LeaseError::AlreadyHeld(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PassLease {
    fn drop(&mut self) {
        // Nothing useful to do if removal fails; the next acquire will
        // report the stale path.
        let _ = std::fs::remove_file(&self.path);
    }
}
