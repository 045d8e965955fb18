//! Domain layer for transcode-registry.
//!
//! This module contains the job entity, its lifecycle state machine and the
//! status reports transcoders send back.

pub mod job;

pub use job::{Applied, JobState, NewTranscodeJob, StatusReport, TranscodeJob, Transition};
