//! Uploaded input artifact model.

use serde::Serialize;
use sqlx::FromRow;

use recongrid_core::graph::builder::InputArtifact;
use recongrid_core::types::DbId;

/// A row from the `input_files` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InputFile {
    pub id: DbId,
    pub job_id: DbId,
    /// Absolute path on the shared filesystem.
    pub path: String,
    pub filename: String,
    /// Pre-structured subject directory rather than a raw volume.
    pub is_subject_dir: bool,
    pub purged: bool,
}

impl InputFile {
    /// View of this row as the builder's input type.
    pub fn as_artifact(&self) -> InputArtifact {
        InputArtifact {
            path: self.path.clone(),
            filename: self.filename.clone(),
            subject_dir: self.is_subject_dir,
        }
    }
}
