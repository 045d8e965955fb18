//! Transcode job entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobState, StatusReport, Transition};
use crate::database::time;
use crate::{Error, Result};

/// Creation input for a transcode job.
///
/// Missing keys deserialize to empty strings so that [`NewTranscodeJob::validate`]
/// can report every absent field at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTranscodeJob {
    /// Source file path.
    #[serde(default)]
    pub input: String,
    /// Destination file path.
    #[serde(default)]
    pub output: String,
    /// Preset identifier understood by the transcoders.
    #[serde(default)]
    pub preset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl NewTranscodeJob {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        preset: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            preset: preset.into(),
            callback_url: None,
        }
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Validate all fields, listing every problem in a single error.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (field, value) in [
            ("input", &self.input),
            ("output", &self.output),
            ("preset", &self.preset),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{} is required", field));
            }
        }

        if let Some(callback) = &self.callback_url {
            match url::Url::parse(callback) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => problems.push(format!(
                    "callback_url has unsupported scheme '{}'",
                    parsed.scheme()
                )),
                Err(e) => problems.push(format!("callback_url is invalid: {}", e)),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(problems.join("; ")))
        }
    }
}

/// Result of applying a status report to a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    pub from: JobState,
    pub to: JobState,
    pub transition: Transition,
    /// False when the report repeated what was already recorded.
    pub changed: bool,
}

/// A single transcoding request and its lifecycle.
///
/// The serialized form is the snapshot handed to every caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub id: String,
    pub state: JobState,
    pub source_file: String,
    pub destination_file: String,
    pub preset_id: String,
    pub remote_job_id: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub duration: Option<f64>,
    pub filesize: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub transcoding_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub callback_url: Option<String>,
}

impl TranscodeJob {
    /// Create a new job in the `scheduled` state.
    pub fn new(request: &NewTranscodeJob) -> Self {
        let now = time::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Scheduled,
            source_file: request.input.trim().to_string(),
            destination_file: request.output.trim().to_string(),
            preset_id: request.preset.trim().to_string(),
            remote_job_id: None,
            progress: None,
            message: None,
            duration: None,
            filesize: None,
            created_at: now,
            transcoding_started_at: None,
            completed_at: None,
            updated_at: now,
            callback_url: request.callback_url.clone(),
        }
    }

    /// Bind the handle a transcoder assigned to this job.
    ///
    /// Binding is permanent; rebinding to the same handle is a no-op.
    pub fn bind_remote(&mut self, handle: &str) -> Result<()> {
        match self.remote_job_id.as_deref() {
            Some(bound) if bound == handle => Ok(()),
            Some(bound) => Err(Error::validation(format!(
                "job {} is bound to transcoder handle '{}', refusing '{}'",
                self.id, bound, handle
            ))),
            None => {
                self.remote_job_id = Some(handle.to_string());
                self.touch();
                Ok(())
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a reported state and its attributes.
    ///
    /// The report is validated against the transition table and applied to a
    /// copy; the job is only modified if every check passes. Out-of-date reports
    /// fail with [`Error::StaleReport`] and leave the job untouched.
    pub fn enter(&mut self, report: &StatusReport) -> Result<Applied> {
        report.validate()?;

        let from = self.state;
        let transition = from.classify(report.state);
        match transition {
            Transition::Rejected => {
                return Err(Error::invalid_transition(
                    from.as_str(),
                    report.state.as_str(),
                ));
            }
            Transition::Stale => {
                return Err(Error::stale(
                    &self.id,
                    format!("{} report arrived after job reached {}", report.state, from),
                ));
            }
            Transition::Advance | Transition::Repeat | Transition::Resume => {}
        }

        let mut next = self.clone();
        next.apply(transition, report)?;

        let changed = next != *self;
        if changed {
            next.touch();
            next.check_invariants()?;
            *self = next;
        }

        Ok(Applied {
            from,
            to: self.state,
            transition,
            changed,
        })
    }

    fn apply(&mut self, transition: Transition, report: &StatusReport) -> Result<()> {
        let attrs = &report.attributes;

        if let Some(handle) = report.remote_job_id.as_deref() {
            let binds = matches!(
                (transition, report.state),
                (Transition::Advance, JobState::Accepted) | (Transition::Resume, _)
            );
            match self.remote_job_id.as_deref() {
                Some(bound) if bound != handle => {
                    return Err(Error::validation(format!(
                        "report for handle '{}' does not match bound handle '{}'",
                        handle, bound
                    )));
                }
                None if binds => self.remote_job_id = Some(handle.to_string()),
                _ => {}
            }
        }

        match (transition, report.state) {
            (Transition::Repeat, JobState::Processing) => {
                if let (Some(reported), Some(recorded)) = (attrs.progress, self.progress)
                    && reported < recorded
                {
                    return Err(Error::stale(
                        &self.id,
                        format!("progress {} is behind recorded {}", reported, recorded),
                    ));
                }
                self.apply_progress(report);
            }
            (Transition::Advance, JobState::Processing) => {
                let started = not_before(attrs.started_at, self.created_at);
                self.transcoding_started_at = Some(started);
                self.apply_progress(report);
            }
            (Transition::Resume, JobState::Processing) => {
                if self.transcoding_started_at.is_none() {
                    let started = not_before(attrs.started_at, self.created_at);
                    self.transcoding_started_at = Some(started);
                }
                // Progress survives the hold unless the transcoder reports a new value.
                self.apply_progress(report);
            }
            (Transition::Advance, JobState::Success) => {
                self.complete(attrs.completed_at);
                if let Some(duration) = attrs.duration {
                    self.duration = Some(duration);
                }
                if let Some(filesize) = attrs.filesize {
                    self.filesize = Some(filesize);
                }
                self.apply_progress(report);
            }
            (Transition::Advance, JobState::Failed) => {
                self.complete(attrs.completed_at);
                self.apply_message(report);
            }
            (Transition::Advance, JobState::OnHold) => {}
            _ => self.apply_message(report),
        }

        self.state = report.state;
        Ok(())
    }

    fn apply_progress(&mut self, report: &StatusReport) {
        if let Some(progress) = report.attributes.progress {
            self.progress = Some(progress);
        }
        self.apply_message(report);
    }

    fn apply_message(&mut self, report: &StatusReport) {
        if let Some(message) = &report.attributes.message {
            self.message = Some(message.clone());
        }
    }

    fn complete(&mut self, reported: Option<DateTime<Utc>>) {
        let floor = self.transcoding_started_at.unwrap_or(self.created_at);
        self.completed_at = Some(not_before(reported, floor));
    }

    fn touch(&mut self) {
        let latest = [self.transcoding_started_at, self.completed_at]
            .into_iter()
            .flatten()
            .fold(self.updated_at, |acc, ts| acc.max(ts));
        self.updated_at = time::now().max(latest);
    }

    /// Verify the record-level invariants.
    pub fn check_invariants(&self) -> Result<()> {
        if self.completed_at.is_some() != self.state.is_terminal() {
            return Err(Error::Other(format!(
                "job {} in state {} has completed_at={:?}",
                self.id, self.state, self.completed_at
            )));
        }

        let mut floor = self.created_at;
        for (name, ts) in [
            ("transcoding_started_at", self.transcoding_started_at),
            ("completed_at", self.completed_at),
        ] {
            if let Some(ts) = ts {
                if ts < floor {
                    return Err(Error::Other(format!(
                        "job {} has {} before an earlier lifecycle timestamp",
                        self.id, name
                    )));
                }
                floor = ts;
            }
        }

        if self.updated_at < floor {
            return Err(Error::Other(format!(
                "job {} has updated_at before its lifecycle timestamps",
                self.id
            )));
        }

        Ok(())
    }
}

/// Pick the reported timestamp (or now), never earlier than `floor`.
fn not_before(reported: Option<DateTime<Utc>>, floor: DateTime<Utc>) -> DateTime<Utc> {
    reported.map(time::truncate).unwrap_or_else(time::now).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_job() -> TranscodeJob {
        let mut job = TranscodeJob::new(&NewTranscodeJob::new("/tmp/a.mov", "/tmp/b.mp4", "h264"));
        job.bind_remote("h1").unwrap();
        job
    }

    fn processing_job(progress: f64) -> TranscodeJob {
        let mut job = create_test_job();
        job.enter(&StatusReport::new(JobState::Accepted)).unwrap();
        job.enter(&StatusReport::new(JobState::Processing).with_progress(progress))
            .unwrap();
        job
    }

    #[test]
    fn test_new_job_is_scheduled() {
        let job = TranscodeJob::new(&NewTranscodeJob::new(" /in.mov ", "/out.mp4", "h264"));
        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.source_file, "/in.mov");
        assert!(job.completed_at.is_none());
        assert!(job.remote_job_id.is_none());
        assert_eq!(job.created_at, job.updated_at);
        job.check_invariants().unwrap();
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let err = NewTranscodeJob::new("", "  ", "").validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("input is required"));
        assert!(msg.contains("output is required"));
        assert!(msg.contains("preset is required"));
    }

    #[test]
    fn test_validate_callback_url() {
        let request = NewTranscodeJob::new("/a", "/b", "h264");
        assert!(request.clone().with_callback_url("https://app/cb/1").validate().is_ok());
        assert!(request.clone().with_callback_url("not a url").validate().is_err());
        assert!(request.with_callback_url("ftp://host/x").validate().is_err());
    }

    #[test]
    fn test_missing_keys_deserialize_to_validation_error() {
        let request: NewTranscodeJob = serde_json::from_str(r#"{"input":"/a.mov"}"#).unwrap();
        let msg = request.validate().unwrap_err().to_string();
        assert!(msg.contains("output is required"));
        assert!(msg.contains("preset is required"));
        assert!(!msg.contains("input is required"));
    }

    #[test]
    fn test_bind_remote_is_permanent() {
        let mut job = create_test_job();
        job.bind_remote("h1").unwrap();
        assert!(job.bind_remote("h2").is_err());
        assert_eq!(job.remote_job_id.as_deref(), Some("h1"));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut job = create_test_job();

        let applied = job.enter(&StatusReport::new(JobState::Accepted)).unwrap();
        assert_eq!(applied.to, JobState::Accepted);
        assert!(applied.changed);

        job.enter(&StatusReport::new(JobState::Processing).with_progress(10.0))
            .unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.progress, Some(10.0));
        assert!(job.transcoding_started_at.is_some());

        let stale = job.enter(&StatusReport::new(JobState::Processing).with_progress(5.0));
        assert!(matches!(stale, Err(Error::StaleReport { .. })));
        assert_eq!(job.progress, Some(10.0));

        job.enter(
            &StatusReport::new(JobState::Success)
                .with_duration(42.0)
                .with_filesize(1000),
        )
        .unwrap();
        assert_eq!(job.state, JobState::Success);
        assert_eq!(job.duration, Some(42.0));
        assert_eq!(job.filesize, Some(1000));
        assert!(job.completed_at.is_some());
        job.check_invariants().unwrap();

        let before = job.clone();
        let result = job.enter(&StatusReport::new(JobState::Processing));
        assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
        assert_eq!(job, before);
    }

    #[test]
    fn test_terminal_job_rejects_every_report() {
        let mut job = processing_job(50.0);
        job.enter(&StatusReport::new(JobState::Failed).with_message("codec error"))
            .unwrap();
        assert_eq!(job.message.as_deref(), Some("codec error"));

        let before = job.clone();
        for state in JobState::ALL {
            let result = job.enter(&StatusReport::new(state).with_progress(99.0));
            assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
            assert_eq!(job, before);
        }
    }

    #[test]
    fn test_progress_sequence_keeps_last_values() {
        let mut job = processing_job(0.0);
        for (progress, message) in [(10.0, "a"), (10.0, "b"), (55.5, "c"), (80.0, "d")] {
            job.enter(
                &StatusReport::new(JobState::Processing)
                    .with_progress(progress)
                    .with_message(message),
            )
            .unwrap();
        }
        assert_eq!(job.progress, Some(80.0));
        assert_eq!(job.message.as_deref(), Some("d"));
    }

    #[test]
    fn test_duplicate_report_is_unchanged() {
        let mut job = processing_job(30.0);
        let before = job.clone();
        let applied = job
            .enter(&StatusReport::new(JobState::Processing).with_progress(30.0))
            .unwrap();
        assert!(!applied.changed);
        assert_eq!(applied.transition, Transition::Repeat);
        assert_eq!(job, before);
    }

    #[test]
    fn test_late_acceptance_is_stale() {
        let mut job = processing_job(20.0);
        let before = job.clone();
        let result = job.enter(&StatusReport::new(JobState::Accepted));
        assert!(matches!(result, Err(Error::StaleReport { .. })));
        assert_eq!(job, before);
    }

    #[test]
    fn test_scheduled_cannot_skip_acceptance() {
        let mut job = create_test_job();
        let before = job.clone();
        assert!(job.enter(&StatusReport::new(JobState::Processing)).is_err());
        assert!(job.enter(&StatusReport::new(JobState::OnHold)).is_err());
        assert_eq!(job, before);
    }

    #[test]
    fn test_on_hold_and_resume_retains_progress() {
        let mut job = processing_job(40.0);
        let started = job.transcoding_started_at;

        job.enter(&StatusReport::on_hold()).unwrap();
        assert_eq!(job.state, JobState::OnHold);
        assert_eq!(job.progress, Some(40.0));

        let applied = job.enter(&StatusReport::new(JobState::Processing)).unwrap();
        assert_eq!(applied.transition, Transition::Resume);
        assert_eq!(job.progress, Some(40.0));
        assert_eq!(job.transcoding_started_at, started);
    }

    #[test]
    fn test_resume_with_explicit_reset() {
        let mut job = processing_job(70.0);
        job.enter(&StatusReport::on_hold()).unwrap();
        job.enter(&StatusReport::new(JobState::Processing).with_progress(0.0))
            .unwrap();
        assert_eq!(job.progress, Some(0.0));
    }

    #[test]
    fn test_resume_from_hold_to_accepted() {
        let mut job = create_test_job();
        job.enter(&StatusReport::new(JobState::Accepted)).unwrap();
        job.enter(&StatusReport::on_hold()).unwrap();
        job.enter(&StatusReport::new(JobState::Accepted).with_remote_job_id("h1"))
            .unwrap();
        assert_eq!(job.state, JobState::Accepted);
    }

    #[test]
    fn test_accept_binds_handle_when_unbound() {
        let mut job = TranscodeJob::new(&NewTranscodeJob::new("/a", "/b", "vp9"));
        job.enter(&StatusReport::new(JobState::Accepted).with_remote_job_id("w-7"))
            .unwrap();
        assert_eq!(job.remote_job_id.as_deref(), Some("w-7"));
    }

    #[test]
    fn test_mismatched_handle_is_rejected() {
        let mut job = create_test_job();
        let before = job.clone();
        let result = job.enter(&StatusReport::new(JobState::Accepted).with_remote_job_id("other"));
        assert!(result.is_err());
        assert_eq!(job, before);
    }

    #[test]
    fn test_reported_timestamps_never_precede_history() {
        let mut job = create_test_job();
        job.enter(&StatusReport::new(JobState::Accepted)).unwrap();
        let long_ago = job.created_at - Duration::days(3);
        job.enter(&StatusReport::new(JobState::Processing).with_started_at(long_ago))
            .unwrap();
        assert_eq!(job.transcoding_started_at, Some(job.created_at));

        job.enter(&StatusReport::new(JobState::Success).with_completed_at(long_ago))
            .unwrap();
        assert!(job.completed_at >= job.transcoding_started_at);
        assert!(job.updated_at >= job.completed_at.unwrap());
        job.check_invariants().unwrap();
    }

    #[test]
    fn test_invalid_attributes_leave_job_unchanged() {
        let mut job = processing_job(10.0);
        let before = job.clone();
        let result = job.enter(&StatusReport::new(JobState::Processing).with_progress(250.0));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(job, before);
    }

    #[test]
    fn test_snapshot_field_names() {
        let job = create_test_job();
        let value = serde_json::to_value(&job).unwrap();
        for key in [
            "id",
            "state",
            "source_file",
            "destination_file",
            "preset_id",
            "remote_job_id",
            "progress",
            "message",
            "duration",
            "filesize",
            "created_at",
            "transcoding_started_at",
            "completed_at",
            "updated_at",
            "callback_url",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["state"], "scheduled");
    }
}
