//! Repository for the `input_files` table.

use sqlx::PgExecutor;

use recongrid_core::types::DbId;

use crate::models::input_file::InputFile;

/// Column list for `input_files` queries.
const COLUMNS: &str = "id, job_id, path, filename, is_subject_dir, purged";

pub struct InputFileRepo;

impl InputFileRepo {
    pub async fn create(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
        path: &str,
        filename: &str,
        is_subject_dir: bool,
    ) -> Result<InputFile, sqlx::Error> {
        let query = format!(
            "INSERT INTO input_files (job_id, path, filename, is_subject_dir) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InputFile>(&query)
            .bind(job_id)
            .bind(path)
            .bind(filename)
            .bind(is_subject_dir)
            .fetch_one(exec)
            .await
    }

    /// All artifacts for a job, in upload order.
    pub async fn for_job(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
    ) -> Result<Vec<InputFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM input_files WHERE job_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, InputFile>(&query)
            .bind(job_id)
            .fetch_all(exec)
            .await
    }

    /// Artifacts still on disk for a job.
    pub async fn unpurged_for_job(
        exec: impl PgExecutor<'_>,
        job_id: DbId,
    ) -> Result<Vec<InputFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM input_files \
             WHERE job_id = $1 AND NOT purged \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, InputFile>(&query)
            .bind(job_id)
            .fetch_all(exec)
            .await
    }

    pub async fn mark_purged(exec: impl PgExecutor<'_>, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE input_files SET purged = TRUE WHERE id = $1")
            .bind(id)
            .execute(exec)
            .await?;
        Ok(())
    }
}
