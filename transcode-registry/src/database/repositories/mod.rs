//! Repository layer for job storage.
//!
//! The registry only talks to the [`JobRepository`] trait; the SQLite and
//! in-memory implementations are interchangeable.

pub mod job;
pub mod memory;

pub use job::*;
pub use memory::InMemoryJobRepository;
