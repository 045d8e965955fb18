//! Transcode job lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle states of a transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created and dispatched; the transcoder has not accepted it yet.
    #[default]
    Scheduled,
    /// The transcoder accepted the job.
    Accepted,
    /// The transcoder is working on the job.
    Processing,
    /// The transcoder stopped responding.
    OnHold,
    /// Transcoding finished successfully.
    Success,
    /// Transcoding failed.
    Failed,
}

/// How a reported state relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Forward step along the lifecycle.
    Advance,
    /// Re-report of the current state.
    Repeat,
    /// Return from `on_hold` to an active stage.
    Resume,
    /// Report for a stage the job has already left.
    Stale,
    /// Not reachable from the current state.
    Rejected,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        Self::Scheduled,
        Self::Accepted,
        Self::Processing,
        Self::OnHold,
        Self::Success,
        Self::Failed,
    ];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Accepted => "accepted",
            Self::Processing => "processing",
            Self::OnHold => "on_hold",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "accepted" => Some(Self::Accepted),
            "processing" => Some(Self::Processing),
            "on_hold" => Some(Self::OnHold),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Check if a transcoder is expected to be actively working on the job.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Accepted | Self::Processing)
    }

    /// Classify a reported state against this one.
    pub fn classify(&self, target: JobState) -> Transition {
        use JobState::*;

        match (self, target) {
            // Nothing leaves a terminal state, not even a repeat of itself
            (Success | Failed, _) => Transition::Rejected,

            (from, to) if *from == to => Transition::Repeat,

            (Scheduled, Accepted) => Transition::Advance,
            (Accepted, Processing) => Transition::Advance,
            (Processing, Success | Failed) => Transition::Advance,
            (Accepted | Processing, OnHold) => Transition::Advance,

            (OnHold, Accepted | Processing) => Transition::Resume,

            // Delayed acceptance arriving after the work started
            (Processing, Accepted) => Transition::Stale,

            _ => Transition::Rejected,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::validation(format!("unknown job state '{}'", s)))
    }
}
