//! In-memory job repository, for tests and embedded use.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::JobRepository;
use crate::database::models::{JobFilters, Pagination};
use crate::domain::{JobState, TranscodeJob};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredJob {
    /// Insertion order, used to break ties between equal creation times.
    seq: u64,
    job: TranscodeJob,
}

/// `DashMap`-backed implementation of [`JobRepository`].
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<String, StoredJob>,
    next_seq: AtomicU64,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get_job(&self, id: &str) -> Result<TranscodeJob> {
        self.jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| Error::not_found("TranscodeJob", id))
    }

    async fn create_job(&self, job: &TranscodeJob) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(Error::Database(format!("job {} already exists", job.id))),
            Entry::Vacant(slot) => {
                slot.insert(StoredJob {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    job: job.clone(),
                });
                Ok(())
            }
        }
    }

    async fn update_job(&self, job: &TranscodeJob) -> Result<()> {
        let mut entry = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| Error::not_found("TranscodeJob", &job.id))?;
        entry.job = job.clone();
        Ok(())
    }

    async fn list_jobs(
        &self,
        filters: &JobFilters,
        pagination: &Pagination,
    ) -> Result<Vec<TranscodeJob>> {
        let mut matching: Vec<StoredJob> = self
            .jobs
            .iter()
            .filter(|entry| filters.matches(&entry.job))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .map(|stored| stored.job)
            .collect())
    }

    async fn count_jobs_by_state(&self) -> Result<Vec<(JobState, u64)>> {
        let mut counts = std::collections::HashMap::new();
        for entry in self.jobs.iter() {
            *counts.entry(entry.job.state).or_insert(0u64) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
