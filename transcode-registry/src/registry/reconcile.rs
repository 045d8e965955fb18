//! Refresh-on-read reconciliation.
//!
//! A job that is not terminal may have moved on without the transcoder telling
//! us. Before handing out a snapshot we ask the owning transcoder, and feed the
//! answer through the same validated path as a pushed report.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::events::UpdateSource;
use super::update::JobUpdater;
use crate::database::repositories::JobRepository;
use crate::domain::{StatusReport, TranscodeJob};
use crate::gateway::{GatewayError, WorkerGateway};
use crate::{Error, Result};

pub struct Reconciler {
    repository: Arc<dyn JobRepository>,
    gateway: Arc<dyn WorkerGateway>,
    updater: JobUpdater,
    status_query_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        gateway: Arc<dyn WorkerGateway>,
        updater: JobUpdater,
        status_query_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            updater,
            status_query_timeout,
        }
    }

    /// Return a snapshot of `job` that reflects what its transcoder reports.
    ///
    /// Terminal and unbound jobs are returned as-is without contacting anyone.
    /// An unreachable transcoder moves an active job to `on_hold`; it is never an
    /// error for the caller. Only storage failures propagate.
    pub async fn ensure_fresh(&self, job: TranscodeJob) -> Result<TranscodeJob> {
        if job.is_terminal() {
            return Ok(job);
        }
        let Some(handle) = job.remote_job_id.clone() else {
            return Ok(job);
        };

        let queried =
            tokio::time::timeout(self.status_query_timeout, self.gateway.query_status(&handle))
                .await
                .unwrap_or_else(|_| {
                    Err(GatewayError::Unreachable(format!(
                        "no answer within {:?}",
                        self.status_query_timeout
                    )))
                });

        let (report, source) = match queried {
            Ok(report) => (report, UpdateSource::Pull),
            Err(GatewayError::Unreachable(reason)) => {
                warn!(job_id = %job.id, remote_job_id = %handle, %reason, "Transcoder unreachable");
                if !job.state.is_active() {
                    return Ok(job);
                }
                (StatusReport::on_hold(), UpdateSource::Unreachable)
            }
            Err(e) => {
                warn!(job_id = %job.id, remote_job_id = %handle, error = %e, "Status query failed");
                return Ok(job);
            }
        };

        match self.updater.apply(&job.id, &report, source).await {
            Ok(outcome) => Ok(outcome.job),
            Err(e) if e.is_client_error() && !matches!(e, Error::NotFound { .. }) => {
                // The record moved on under us (e.g. a pushed report finished it)
                // or the transcoder reported something we cannot apply.
                debug!(job_id = %job.id, error = %e, %source, "Reconciliation report not applied");
                self.repository.get_job(&job.id).await
            }
            Err(e) => Err(e),
        }
    }
}
