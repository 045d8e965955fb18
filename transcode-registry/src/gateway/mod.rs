//! Contract between the registry and the transcoders.
//!
//! The registry never assumes a transport. It needs exactly two capabilities
//! from whoever fronts the worker pool: hand out new work, and answer "what is
//! the status of the job you know as `handle`". [`http::HttpWorkerGateway`]
//! implements them over a worker REST API.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{StatusReport, TranscodeJob};

pub use http::{HttpGatewayConfig, HttpWorkerGateway};

/// Work handed to a transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Registry-side job id, echoed back by transcoders that push updates.
    pub job_id: String,
    pub input: String,
    pub output: String,
    pub preset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl From<&TranscodeJob> for DispatchRequest {
    fn from(job: &TranscodeJob) -> Self {
        Self {
            job_id: job.id.clone(),
            input: job.source_file.clone(),
            output: job.destination_file.clone(),
            preset: job.preset_id.clone(),
            callback_url: job.callback_url.clone(),
        }
    }
}

/// Failures talking to a transcoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No transcoder has capacity for new work.
    #[error("no transcoder capacity: {0}")]
    Unavailable(String),

    /// The transcoder did not answer (refused, reset, timed out).
    #[error("transcoder unreachable: {0}")]
    Unreachable(String),

    /// The transcoder does not know the handle.
    #[error("unknown remote job handle '{0}'")]
    UnknownHandle(String),

    /// The transcoder answered with something we cannot interpret.
    #[error("transcoder protocol error: {0}")]
    Protocol(String),
}

impl From<GatewayError> for crate::Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => Self::DispatchUnavailable(msg),
            GatewayError::Unreachable(msg) => Self::Unreachable(msg),
            GatewayError::UnknownHandle(handle) => Self::not_found("RemoteJob", handle),
            GatewayError::Protocol(msg) => Self::Other(msg),
        }
    }
}

/// Access to the transcoder pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkerGateway: Send + Sync {
    /// Submit new work, returning the handle the transcoder assigned to it.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<String, GatewayError>;

    /// Ask the transcoder owning `remote_job_id` for its current status.
    async fn query_status(&self, remote_job_id: &str) -> Result<StatusReport, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTranscodeJob;

    #[test]
    fn test_dispatch_request_from_job() {
        let job = TranscodeJob::new(
            &NewTranscodeJob::new("/in.mov", "/out.mp4", "h264").with_callback_url("https://cb"),
        );
        let request = DispatchRequest::from(&job);
        assert_eq!(request.job_id, job.id);
        assert_eq!(request.input, "/in.mov");
        assert_eq!(request.output, "/out.mp4");
        assert_eq!(request.preset, "h264");
        assert_eq!(request.callback_url.as_deref(), Some("https://cb"));
    }

    #[test]
    fn test_gateway_error_conversion() {
        assert!(matches!(
            crate::Error::from(GatewayError::Unavailable("full".into())),
            crate::Error::DispatchUnavailable(_)
        ));
        assert!(matches!(
            crate::Error::from(GatewayError::UnknownHandle("h1".into())),
            crate::Error::NotFound { .. }
        ));
    }
}
