//! [`WorkerGateway`] over a transcoder REST API.
//!
//! - `POST {base}/jobs` with a [`DispatchRequest`] body answers `{"id": "<handle>"}`.
//! - `GET {base}/jobs/{handle}` answers a [`StatusReport`].

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{DispatchRequest, GatewayError, WorkerGateway};
use crate::domain::StatusReport;
use crate::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Connection settings for [`HttpWorkerGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: Url,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid worker base URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    id: String,
}

/// Talks to a transcoder pool over HTTP+JSON.
pub struct HttpWorkerGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

impl HttpWorkerGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        install_rustls_provider();

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn jobs_url(&self) -> std::result::Result<Url, GatewayError> {
        self.config
            .base_url
            .join("jobs")
            .map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    fn job_url(&self, remote_job_id: &str) -> std::result::Result<Url, GatewayError> {
        let mut url = self.jobs_url()?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Protocol("worker base URL cannot be a base".into()))?
            .push(remote_job_id);
        Ok(url)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        GatewayError::Unreachable(err.to_string())
    } else {
        GatewayError::Protocol(err.to_string())
    }
}

#[async_trait]
impl WorkerGateway for HttpWorkerGateway {
    async fn dispatch(&self, request: &DispatchRequest) -> std::result::Result<String, GatewayError> {
        let url = self.jobs_url()?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: DispatchResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Protocol(format!("bad dispatch response: {}", e)))?;
                debug!(job_id = %request.job_id, remote_job_id = %body.id, "Job dispatched");
                Ok(body.id)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                Err(GatewayError::Unavailable(format!(
                    "transcoder answered {}",
                    response.status()
                )))
            }
            status if status.is_server_error() => {
                Err(GatewayError::Unreachable(format!("transcoder answered {}", status)))
            }
            status => Err(GatewayError::Protocol(format!(
                "unexpected dispatch status {}",
                status
            ))),
        }
    }

    async fn query_status(
        &self,
        remote_job_id: &str,
    ) -> std::result::Result<StatusReport, GatewayError> {
        let url = self.job_url(remote_job_id)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let mut report: StatusReport = response.json().await.map_err(|e| {
                    GatewayError::Protocol(format!("bad status payload: {}", e))
                })?;
                if report.remote_job_id.is_none() {
                    report.remote_job_id = Some(remote_job_id.to_string());
                }
                Ok(report)
            }
            StatusCode::NOT_FOUND => Err(GatewayError::UnknownHandle(remote_job_id.to_string())),
            status if status.is_server_error() => {
                Err(GatewayError::Unreachable(format!("transcoder answered {}", status)))
            }
            status => {
                warn!(remote_job_id, %status, "Unexpected status query response");
                Err(GatewayError::Protocol(format!(
                    "unexpected status query response {}",
                    status
                )))
            }
        }
    }
}
