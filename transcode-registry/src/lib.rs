//! transcode-registry library crate.
//!
//! Tracks transcode jobs handed to a pool of stateless transcoders and keeps
//! their state current through pushed reports and refresh-on-read.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod registry;

pub use error::{Error, Result};
