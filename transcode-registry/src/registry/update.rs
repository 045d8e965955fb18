//! The single validated write path for job state.
//!
//! Pushed reports and pulled statuses both end up in [`JobUpdater::apply`], so
//! there is exactly one place where transitions are checked and persisted.

use std::sync::Arc;

use tracing::{debug, info};

use super::events::{JobEvent, JobEventBroadcaster, UpdateSource};
use super::locks::JobLocks;
use crate::database::repositories::JobRepository;
use crate::domain::{Applied, StatusReport, TranscodeJob};
use crate::{Error, Result};

/// Outcome of applying a report.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The job as it is now stored.
    pub job: TranscodeJob,
    /// `None` when the report was stale and ignored.
    pub applied: Option<Applied>,
}

#[derive(Clone)]
pub struct JobUpdater {
    repository: Arc<dyn JobRepository>,
    locks: Arc<JobLocks>,
    events: JobEventBroadcaster,
}

impl JobUpdater {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        locks: Arc<JobLocks>,
        events: JobEventBroadcaster,
    ) -> Self {
        Self {
            repository,
            locks,
            events,
        }
    }

    /// Load the job, run the state machine and persist the result, all under the
    /// job's lock.
    ///
    /// Stale reports are absorbed into an [`ApplyOutcome`] with `applied: None`.
    /// Invalid transitions and validation failures are returned as errors and
    /// leave the stored job untouched.
    pub async fn apply(
        &self,
        job_id: &str,
        report: &StatusReport,
        source: UpdateSource,
    ) -> Result<ApplyOutcome> {
        let _guard = self.locks.lock(job_id).await;

        let mut job = self.repository.get_job(job_id).await?;

        let applied = match job.enter(report) {
            Ok(applied) => applied,
            Err(Error::StaleReport { reason, .. }) => {
                debug!(job_id, %source, %reason, "Ignoring stale report");
                return Ok(ApplyOutcome { job, applied: None });
            }
            Err(e) => return Err(e),
        };

        if applied.changed {
            self.repository.update_job(&job).await?;

            if applied.from != applied.to {
                info!(
                    job_id,
                    from = %applied.from,
                    to = %applied.to,
                    %source,
                    "Job state changed"
                );
            } else {
                debug!(job_id, state = %applied.to, progress = ?job.progress, %source, "Job updated");
            }

            self.events.publish(JobEvent::Updated {
                job_id: job.id.clone(),
                from: applied.from,
                to: applied.to,
                progress: job.progress,
                source,
                at: job.updated_at,
            });
        }

        Ok(ApplyOutcome {
            job,
            applied: Some(applied),
        })
    }
}
