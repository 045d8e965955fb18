//! Transcode job database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{JobState, TranscodeJob};
use crate::{Error, Result};

/// Transcode job database model.
/// Timestamps are Unix epoch milliseconds (UTC).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TranscodeJobDbModel {
    pub id: String,
    /// scheduled, accepted, processing, on_hold, success, failed
    pub state: String,
    pub source_file: String,
    pub destination_file: String,
    pub preset_id: String,
    pub remote_job_id: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub duration: Option<f64>,
    pub filesize: Option<i64>,
    pub created_at: i64,
    pub transcoding_started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
    pub callback_url: Option<String>,
}

impl From<&TranscodeJob> for TranscodeJobDbModel {
    fn from(job: &TranscodeJob) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state.as_str().to_string(),
            source_file: job.source_file.clone(),
            destination_file: job.destination_file.clone(),
            preset_id: job.preset_id.clone(),
            remote_job_id: job.remote_job_id.clone(),
            progress: job.progress,
            message: job.message.clone(),
            duration: job.duration,
            filesize: job.filesize.map(|size| size.min(i64::MAX as u64) as i64),
            created_at: datetime_to_ms(job.created_at),
            transcoding_started_at: job.transcoding_started_at.map(datetime_to_ms),
            completed_at: job.completed_at.map(datetime_to_ms),
            updated_at: datetime_to_ms(job.updated_at),
            callback_url: job.callback_url.clone(),
        }
    }
}

impl TryFrom<TranscodeJobDbModel> for TranscodeJob {
    type Error = Error;

    fn try_from(row: TranscodeJobDbModel) -> Result<Self> {
        let state = JobState::parse(&row.state).ok_or_else(|| {
            Error::Database(format!("job {} has unknown state '{}'", row.id, row.state))
        })?;

        Ok(Self {
            id: row.id,
            state,
            source_file: row.source_file,
            destination_file: row.destination_file,
            preset_id: row.preset_id,
            remote_job_id: row.remote_job_id,
            progress: row.progress,
            message: row.message,
            duration: row.duration,
            filesize: row.filesize.map(|size| size.max(0) as u64),
            created_at: ms_to_datetime(row.created_at),
            transcoding_started_at: row.transcoding_started_at.map(ms_to_datetime),
            completed_at: row.completed_at.map(ms_to_datetime),
            updated_at: ms_to_datetime(row.updated_at),
            callback_url: row.callback_url,
        })
    }
}

/// Filters for listing jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobState>,
}

impl JobFilters {
    pub fn with_state(state: JobState) -> Self {
        Self { state: Some(state) }
    }

    pub fn matches(&self, job: &TranscodeJob) -> bool {
        self.state.is_none_or(|state| state == job.state)
    }
}

/// A bounded window into a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Build a window from a 1-based page number. Page 0 is treated as page 1.
    pub fn page(page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        Self {
            limit: per_page,
            offset: (page - 1).saturating_mul(per_page),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::page(1, 25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTranscodeJob, StatusReport};

    #[test]
    fn test_db_model_round_trip() {
        let mut job = TranscodeJob::new(
            &NewTranscodeJob::new("/a.mov", "/b.mp4", "h264").with_callback_url("https://cb/1"),
        );
        job.bind_remote("h1").unwrap();
        job.enter(&StatusReport::new(JobState::Accepted)).unwrap();
        job.enter(&StatusReport::new(JobState::Processing).with_progress(12.5))
            .unwrap();

        let row = TranscodeJobDbModel::from(&job);
        assert_eq!(row.state, "processing");
        let restored = TranscodeJob::try_from(row).unwrap();
        assert_eq!(restored, job);
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let job = TranscodeJob::new(&NewTranscodeJob::new("/a", "/b", "p"));
        let mut row = TranscodeJobDbModel::from(&job);
        row.state = "PENDING".to_string();
        assert!(TranscodeJob::try_from(row).is_err());
    }

    #[test]
    fn test_pagination_page() {
        assert_eq!(Pagination::page(1, 20), Pagination::new(20, 0));
        assert_eq!(Pagination::page(3, 20), Pagination::new(20, 40));
        assert_eq!(Pagination::page(0, 10), Pagination::new(10, 0));
    }

    #[test]
    fn test_filters_match() {
        let job = TranscodeJob::new(&NewTranscodeJob::new("/a", "/b", "p"));
        assert!(JobFilters::default().matches(&job));
        assert!(JobFilters::with_state(JobState::Scheduled).matches(&job));
        assert!(!JobFilters::with_state(JobState::Failed).matches(&job));
    }
}
