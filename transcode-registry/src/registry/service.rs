//! Registry service: the entry points external callers use.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use super::events::{JobEvent, JobEventBroadcaster, UpdateSource};
use super::locks::JobLocks;
use super::reconcile::Reconciler;
use super::update::JobUpdater;
use crate::database::models::{JobFilters, Pagination};
use crate::database::repositories::JobRepository;
use crate::domain::{JobState, NewTranscodeJob, StatusReport, TranscodeJob};
use crate::gateway::{DispatchRequest, GatewayError, WorkerGateway};
use crate::{Error, Result};

/// Tunables for [`RegistryService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryServiceConfig {
    /// Deadline for handing a job to a transcoder.
    pub dispatch_timeout: Duration,
    /// Deadline for a reconciliation status query; exceeding it counts as unreachable.
    pub status_query_timeout: Duration,
    /// How many jobs of a listed page are reconciled concurrently.
    pub list_reconcile_concurrency: usize,
}

impl Default for RegistryServiceConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
            status_query_timeout: Duration::from_secs(10),
            list_reconcile_concurrency: 8,
        }
    }
}

/// Number of jobs per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub scheduled: u64,
    pub accepted: u64,
    pub processing: u64,
    pub on_hold: u64,
    pub success: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn total(&self) -> u64 {
        self.scheduled + self.accepted + self.processing + self.on_hold + self.success + self.failed
    }

    fn add(&mut self, state: JobState, count: u64) {
        let slot = match state {
            JobState::Scheduled => &mut self.scheduled,
            JobState::Accepted => &mut self.accepted,
            JobState::Processing => &mut self.processing,
            JobState::OnHold => &mut self.on_hold,
            JobState::Success => &mut self.success,
            JobState::Failed => &mut self.failed,
        };
        *slot += count;
    }
}

/// Owns the job records and coordinates them with the transcoder pool.
///
/// Storage and the transcoder gateway are injected; whoever constructs the
/// service owns their lifecycle.
pub struct RegistryService {
    repository: Arc<dyn JobRepository>,
    gateway: Arc<dyn WorkerGateway>,
    updater: JobUpdater,
    reconciler: Reconciler,
    events: JobEventBroadcaster,
    config: RegistryServiceConfig,
}

impl RegistryService {
    pub fn new(repository: Arc<dyn JobRepository>, gateway: Arc<dyn WorkerGateway>) -> Self {
        Self::with_config(repository, gateway, RegistryServiceConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn JobRepository>,
        gateway: Arc<dyn WorkerGateway>,
        config: RegistryServiceConfig,
    ) -> Self {
        let events = JobEventBroadcaster::new();
        let updater = JobUpdater::new(repository.clone(), Arc::new(JobLocks::new()), events.clone());
        let reconciler = Reconciler::new(
            repository.clone(),
            gateway.clone(),
            updater.clone(),
            config.status_query_timeout,
        );

        Self {
            repository,
            gateway,
            updater,
            reconciler,
            events,
            config,
        }
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Validate a request, dispatch it to a transcoder and record the job.
    ///
    /// Nothing is stored unless the dispatch succeeds: when no transcoder has
    /// capacity the caller gets [`Error::DispatchUnavailable`] and may retry.
    #[instrument(skip(self, request), fields(input = %request.input, preset = %request.preset))]
    pub async fn create(&self, request: NewTranscodeJob) -> Result<TranscodeJob> {
        request.validate()?;

        let mut job = TranscodeJob::new(&request);
        let dispatch = DispatchRequest::from(&job);

        let handle = tokio::time::timeout(
            self.config.dispatch_timeout,
            self.gateway.dispatch(&dispatch),
        )
        .await
        .unwrap_or_else(|_| {
            Err(GatewayError::Unavailable(format!(
                "dispatch not answered within {:?}",
                self.config.dispatch_timeout
            )))
        })
        .map_err(|e| match e {
            GatewayError::Unavailable(msg) | GatewayError::Unreachable(msg) => {
                warn!(job_id = %job.id, reason = %msg, "No transcoder accepted the dispatch");
                Error::DispatchUnavailable(msg)
            }
            other => Error::from(other),
        })?;

        job.bind_remote(&handle)?;

        if let Err(e) = self.repository.create_job(&job).await {
            error!(
                job_id = %job.id,
                remote_job_id = %handle,
                error = %e,
                "Dispatched job could not be recorded"
            );
            return Err(e);
        }

        info!(job_id = %job.id, remote_job_id = %handle, "Transcode job created");
        self.events.publish(JobEvent::Created {
            job_id: job.id.clone(),
            remote_job_id: handle,
            at: job.created_at,
        });

        Ok(job)
    }

    /// Apply a report pushed by a transcoder.
    ///
    /// Stale reports are ignored and the current snapshot is returned.
    /// Unreachable or disallowed states fail with
    /// [`Error::InvalidStateTransition`] and leave the job unchanged.
    pub async fn report_update(&self, job_id: &str, report: StatusReport) -> Result<TranscodeJob> {
        let outcome = self
            .updater
            .apply(job_id, &report, UpdateSource::Push)
            .await
            .inspect_err(|e| {
                if e.is_client_error() {
                    debug!(job_id, state = %report.state, error = %e, "Rejected transcoder report");
                }
            })?;
        Ok(outcome.job)
    }

    /// Look up a job, refreshing it from its transcoder when it is not terminal.
    pub async fn get(&self, job_id: &str) -> Result<TranscodeJob> {
        let job = self.repository.get_job(job_id).await?;
        self.reconciler.ensure_fresh(job).await
    }

    /// List one page of jobs, newest first, refreshing every non-terminal one.
    ///
    /// Each job is reconciled on its own; dropping the returned future part way
    /// leaves every job either fully reconciled or untouched.
    pub async fn list(
        &self,
        filters: &JobFilters,
        pagination: &Pagination,
    ) -> Result<Vec<TranscodeJob>> {
        let jobs = self.repository.list_jobs(filters, pagination).await?;
        let concurrency = self.config.list_reconcile_concurrency.max(1);

        stream::iter(jobs)
            .map(|job| self.reconciler.ensure_fresh(job))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    /// Count jobs per state.
    pub async fn stats(&self) -> Result<JobStats> {
        let mut stats = JobStats::default();
        for (state, count) in self.repository.count_jobs_by_state().await? {
            stats.add(state, count);
        }
        Ok(stats)
    }
}
