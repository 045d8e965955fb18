//! Transcode job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{JobFilters, Pagination, TranscodeJobDbModel};
use crate::domain::{JobState, TranscodeJob};
use crate::{Error, Result};

/// Storage collaborator owning the persisted job records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: &str) -> Result<TranscodeJob>;
    async fn create_job(&self, job: &TranscodeJob) -> Result<()>;
    /// Overwrite the mutable columns of an existing job.
    async fn update_job(&self, job: &TranscodeJob) -> Result<()>;
    /// List jobs newest-created first.
    async fn list_jobs(
        &self,
        filters: &JobFilters,
        pagination: &Pagination,
    ) -> Result<Vec<TranscodeJob>>;
    async fn count_jobs_by_state(&self) -> Result<Vec<(JobState, u64)>>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn get_job(&self, id: &str) -> Result<TranscodeJob> {
        sqlx::query_as::<_, TranscodeJobDbModel>("SELECT * FROM transcode_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("TranscodeJob", id))?
            .try_into()
    }

    async fn create_job(&self, job: &TranscodeJob) -> Result<()> {
        let row = TranscodeJobDbModel::from(job);
        sqlx::query(
            r#"
            INSERT INTO transcode_jobs (
                id, state, source_file, destination_file, preset_id, remote_job_id,
                progress, message, duration, filesize, created_at,
                transcoding_started_at, completed_at, updated_at, callback_url
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.state)
        .bind(&row.source_file)
        .bind(&row.destination_file)
        .bind(&row.preset_id)
        .bind(&row.remote_job_id)
        .bind(row.progress)
        .bind(&row.message)
        .bind(row.duration)
        .bind(row.filesize)
        .bind(row.created_at)
        .bind(row.transcoding_started_at)
        .bind(row.completed_at)
        .bind(row.updated_at)
        .bind(&row.callback_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job: &TranscodeJob) -> Result<()> {
        let row = TranscodeJobDbModel::from(job);
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs SET
                state = ?,
                remote_job_id = ?,
                progress = ?,
                message = ?,
                duration = ?,
                filesize = ?,
                transcoding_started_at = ?,
                completed_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.state)
        .bind(&row.remote_job_id)
        .bind(row.progress)
        .bind(&row.message)
        .bind(row.duration)
        .bind(row.filesize)
        .bind(row.transcoding_started_at)
        .bind(row.completed_at)
        .bind(row.updated_at)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("TranscodeJob", &job.id));
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        filters: &JobFilters,
        pagination: &Pagination,
    ) -> Result<Vec<TranscodeJob>> {
        let rows = match filters.state {
            Some(state) => {
                sqlx::query_as::<_, TranscodeJobDbModel>(
                    "SELECT * FROM transcode_jobs WHERE state = ? \
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(state.as_str())
                .bind(pagination.limit as i64)
                .bind(pagination.offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TranscodeJobDbModel>(
                    "SELECT * FROM transcode_jobs \
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(pagination.limit as i64)
                .bind(pagination.offset as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(TranscodeJob::try_from).collect()
    }

    async fn count_jobs_by_state(&self) -> Result<Vec<(JobState, u64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM transcode_jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(state, count)| {
                JobState::parse(&state)
                    .map(|state| (state, count.max(0) as u64))
                    .ok_or_else(|| Error::Database(format!("unknown job state '{}'", state)))
            })
            .collect()
    }
}
