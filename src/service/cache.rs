//! In-memory job cache
//!
//! Status reads take a shared lock; pipeline writes take the exclusive one.
//! A separate running set makes sure at most one pipeline executes per job.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::MigrationJob;

pub struct JobCache {
    jobs: RwLock<HashMap<Uuid, MigrationJob>>,
    running: Mutex<HashSet<Uuid>>,
    retention: Duration,
}

/// Held while a pipeline runs for a job. Dropping it releases the slot.
pub struct RunGuard<'a> {
    cache: &'a JobCache,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.cache.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.id);
    }
}

impl JobCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
            retention,
        }
    }

    pub async fn insert(&self, job: MigrationJob) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Snapshot of a job. Expired entries read as absent; removing them
    /// is left to `evict_expired` so their files go with them.
    pub async fn get(&self, id: Uuid) -> Option<MigrationJob> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).filter(|job| !self.is_expired(job)).cloned()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.jobs.read().await.contains_key(&id)
    }

    /// Apply a mutation and return the updated snapshot.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Option<MigrationJob>
    where
        F: FnOnce(&mut MigrationJob),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).filter(|job| !self.is_expired(job))?;
        f(job);
        job.updated_at = Utc::now();
        Some(job.clone())
    }

    /// Claim the pipeline slot for a job.
    pub fn acquire(&self, id: Uuid) -> Option<RunGuard<'_>> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(id) {
            return None;
        }
        Some(RunGuard { cache: self, id })
    }

    pub fn is_running(&self, id: Uuid) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.contains(&id)
    }

    /// Drop every finished job past retention and return their ids.
    pub async fn evict_expired(&self) -> Vec<Uuid> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|job| self.is_expired(job))
            .map(|job| job.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    fn is_expired(&self, job: &MigrationJob) -> bool {
        let Some(finished) = job.finished_at else {
            return false;
        };
        let age = Utc::now().signed_duration_since(finished);
        age.to_std().map(|age| age >= self.retention).unwrap_or(false)
    }
}
