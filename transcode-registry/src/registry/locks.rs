//! Per-job mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes mutations of a single job while leaving different jobs independent.
///
/// Lock entries are created on demand and dropped again once nobody holds or
/// waits on them, so the map only grows with the number of in-flight mutations.
#[derive(Debug, Default)]
pub struct JobLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Guard for one job. Releases the lock (and prunes its entry) on drop.
pub struct JobLockGuard<'a> {
    owner: &'a JobLocks,
    job_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `job_id`.
    pub async fn lock(&self, job_id: &str) -> JobLockGuard<'_> {
        let mutex = self
            .locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        JobLockGuard {
            owner: self,
            job_id: job_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of jobs with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for JobLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still references the mutex: nobody holds or awaits it.
        self.owner
            .locks
            .remove_if(&self.job_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_job_is_serialized() {
        let locks = Arc::new(JobLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock("job-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_jobs_are_independent() {
        let locks = JobLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_pruned_on_release() {
        let locks = JobLocks::new();
        {
            let _guard = locks.lock("job").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
