//! Database models for transcode-registry.
//!
//! These models map directly to the database schema and convert to and from
//! the domain entities.

pub mod job;

pub use job::*;
