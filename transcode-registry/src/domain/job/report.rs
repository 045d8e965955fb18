//! Status reports sent by transcoders, either pushed or pulled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobState;
use crate::{Error, Result};

/// Worker-supplied attributes accompanying a state report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAttributes {
    /// Percent complete, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Media duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Output file size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A claimed state plus attributes, as reported by a transcoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: JobState,
    /// Handle the transcoder knows the job by, if it includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_job_id: Option<String>,
    #[serde(flatten)]
    pub attributes: ReportAttributes,
}

impl StatusReport {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            remote_job_id: None,
            attributes: ReportAttributes::default(),
        }
    }

    /// Report produced by the registry itself when the transcoder stops answering.
    pub fn on_hold() -> Self {
        Self::new(JobState::OnHold)
    }

    pub fn with_remote_job_id(mut self, handle: impl Into<String>) -> Self {
        self.remote_job_id = Some(handle.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.attributes.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.attributes.message = Some(message.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.attributes.duration = Some(duration);
        self
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.attributes.filesize = Some(filesize);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.attributes.started_at = Some(at);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.attributes.completed_at = Some(at);
        self
    }

    /// Reject attribute values no transcoder can legitimately produce.
    pub fn validate(&self) -> Result<()> {
        if let Some(progress) = self.attributes.progress
            && !(progress.is_finite() && (0.0..=100.0).contains(&progress))
        {
            return Err(Error::validation(format!(
                "progress must be between 0 and 100, got {}",
                progress
            )));
        }

        if let Some(duration) = self.attributes.duration
            && !(duration.is_finite() && duration >= 0.0)
        {
            return Err(Error::validation(format!(
                "duration must be a non-negative number, got {}",
                duration
            )));
        }

        // Stored as a signed 64-bit integer
        if let Some(filesize) = self.attributes.filesize
            && filesize > i64::MAX as u64
        {
            return Err(Error::validation(format!(
                "filesize must not exceed {} bytes, got {}",
                i64::MAX,
                filesize
            )));
        }

        if let Some(handle) = &self.remote_job_id
            && handle.trim().is_empty()
        {
            return Err(Error::validation("remote_job_id must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_worker_payload() {
        let report: StatusReport = serde_json::from_str(
            r#"{"state":"processing","progress":42.5,"message":"pass 1/2"}"#,
        )
        .unwrap();

        assert_eq!(report.state, JobState::Processing);
        assert_eq!(report.attributes.progress, Some(42.5));
        assert_eq!(report.attributes.message.as_deref(), Some("pass 1/2"));
        assert!(report.remote_job_id.is_none());
    }

    #[test]
    fn test_deserialize_rejects_unknown_state() {
        let result = serde_json::from_str::<StatusReport>(r#"{"state":"exploded"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_progress_bounds() {
        assert!(StatusReport::new(JobState::Processing).with_progress(0.0).validate().is_ok());
        assert!(StatusReport::new(JobState::Processing).with_progress(100.0).validate().is_ok());
        assert!(StatusReport::new(JobState::Processing).with_progress(100.5).validate().is_err());
        assert!(StatusReport::new(JobState::Processing).with_progress(-1.0).validate().is_err());
        assert!(StatusReport::new(JobState::Processing).with_progress(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_validate_duration_and_handle() {
        assert!(StatusReport::new(JobState::Success).with_duration(-3.0).validate().is_err());
        assert!(
            StatusReport::new(JobState::Accepted)
                .with_remote_job_id("  ")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_filesize_fits_storage() {
        let largest = i64::MAX as u64;
        assert!(StatusReport::new(JobState::Success).with_filesize(largest).validate().is_ok());

        let err = StatusReport::new(JobState::Success)
            .with_filesize(largest + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
