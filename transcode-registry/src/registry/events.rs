//! Job lifecycle events.
//!
//! Every persisted change to a job is broadcast so that other services (a
//! callback notifier, a websocket feed) can react without polling the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::JobState;

/// Default channel capacity for job events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Where a state change came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateSource {
    /// Report pushed by a transcoder.
    Push,
    /// Status pulled from a transcoder during reconciliation.
    Pull,
    /// The transcoder did not answer a status query.
    Unreachable,
}

/// Events broadcast when a job changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was created and dispatched.
    Created {
        job_id: String,
        remote_job_id: String,
        at: DateTime<Utc>,
    },
    /// A job's state or attributes changed.
    Updated {
        job_id: String,
        from: JobState,
        to: JobState,
        progress: Option<f64>,
        source: UpdateSource,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Created { job_id, .. } | Self::Updated { job_id, .. } => job_id,
        }
    }

    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::Created {
                job_id,
                remote_job_id,
                ..
            } => format!("Job {} created as {}", job_id, remote_job_id),
            Self::Updated {
                job_id,
                from,
                to,
                source,
                ..
            } if from == to => format!("Job {} updated in {} ({})", job_id, to, source),
            Self::Updated {
                job_id,
                from,
                to,
                source,
                ..
            } => format!("Job {} moved {} -> {} ({})", job_id, from, to, source),
        }
    }
}

/// Broadcaster for job events.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBroadcaster {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: JobEvent) -> usize {
        tracing::debug!("Publishing job event: {}", event.description());
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let broadcaster = JobEventBroadcaster::new();
        assert_eq!(
            broadcaster.publish(JobEvent::Created {
                job_id: "j0".into(),
                remote_job_id: "h0".into(),
                at: Utc::now(),
            }),
            0
        );

        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        let event = JobEvent::Updated {
            job_id: "j1".into(),
            from: JobState::Accepted,
            to: JobState::Processing,
            progress: Some(5.0),
            source: UpdateSource::Push,
            at: Utc::now(),
        };
        assert_eq!(broadcaster.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_description() {
        let event = JobEvent::Updated {
            job_id: "j1".into(),
            from: JobState::Processing,
            to: JobState::OnHold,
            progress: None,
            source: UpdateSource::Unreachable,
            at: Utc::now(),
        };
        assert_eq!(
            event.description(),
            "Job j1 moved processing -> on_hold (unreachable)"
        );
        assert_eq!(event.job_id(), "j1");
    }
}
