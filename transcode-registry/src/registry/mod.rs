//! Registry layer: job creation, transcoder reports and refresh-on-read.

pub mod events;
pub mod locks;
pub mod reconcile;
pub mod service;
pub mod update;

pub use events::{JobEvent, JobEventBroadcaster, UpdateSource};
pub use locks::JobLocks;
pub use reconcile::Reconciler;
pub use service::{JobStats, RegistryService, RegistryServiceConfig};
pub use update::{ApplyOutcome, JobUpdater};
