//! Filesystem layout for per-owner data trees.
//!
//! Every path the service reads or deletes is computed here. The layout
//! under the shared base is:
//!
//! ```text
//! <base>/<owner>/input/<filename>
//! <base>/<owner>/results/<job_id>_<subject>_output.tar.bz2
//! <base>/<owner>/results/recon_all-<job_id>.log
//! <base>/<owner>/workflows/<handle>/            (backend scratch)
//! <base>/<owner>/workflows/output/<handle>/     (backend output)
//! ```
//!
//! Scratch and output subtrees are keyed by the backend execution handle.

use std::path::{Path, PathBuf};

use crate::types::DbId;

/// Path calculator rooted at the shared data base directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    base: PathBuf,
}

impl DataLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn user_dir(&self, owner: &str) -> PathBuf {
        self.base.join(owner)
    }

    pub fn input_dir(&self, owner: &str) -> PathBuf {
        self.user_dir(owner).join("input")
    }

    pub fn input_file(&self, owner: &str, filename: &str) -> PathBuf {
        self.input_dir(owner).join(filename)
    }

    pub fn results_dir(&self, owner: &str) -> PathBuf {
        self.user_dir(owner).join("results")
    }

    /// Durable copy of the terminal artifact.
    pub fn result_tarball(&self, owner: &str, job_id: DbId, subject: &str) -> PathBuf {
        self.results_dir(owner)
            .join(format!("{job_id}_{subject}_output.tar.bz2"))
    }

    /// Durable copy of the reconstruction log.
    pub fn result_log(&self, owner: &str, job_id: DbId) -> PathBuf {
        self.results_dir(owner).join(format!("recon_all-{job_id}.log"))
    }

    /// Submit directory handed to the scheduler; the backend creates
    /// handle-keyed subdirectories beneath it.
    pub fn workflows_dir(&self, owner: &str) -> PathBuf {
        self.user_dir(owner).join("workflows")
    }

    /// Root of the backend's transfer-out tree.
    pub fn output_dir(&self, owner: &str) -> PathBuf {
        self.workflows_dir(owner).join("output")
    }

    /// Backend scratch directory for one run.
    pub fn scratch_dir(&self, owner: &str, handle: &str) -> PathBuf {
        self.workflows_dir(owner).join(handle)
    }

    /// Backend output directory for one run.
    pub fn handle_output_dir(&self, owner: &str, handle: &str) -> PathBuf {
        self.output_dir(owner).join(handle)
    }

    /// Where the backend leaves the terminal artifact for one run.
    pub fn backend_result_tarball(&self, owner: &str, handle: &str, subject: &str) -> PathBuf {
        self.handle_output_dir(owner, handle)
            .join(format!("{subject}_output.tar.bz2"))
    }

    /// Where the backend leaves the reconstruction log for one run.
    pub fn backend_log(&self, owner: &str, handle: &str) -> PathBuf {
        self.handle_output_dir(owner, handle).join("recon-all.log")
    }
}
