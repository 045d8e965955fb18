//! Transcode job domain module.

mod entity;
mod report;
mod state;

pub use entity::{Applied, NewTranscodeJob, TranscodeJob};
pub use report::{ReportAttributes, StatusReport};
pub use state::{JobState, Transition};
