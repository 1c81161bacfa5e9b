//! Process-wide job registry.
//!
//! Jobs are created when a run is requested, updated by that run's task, and
//! read by the polling endpoint. Entries are never removed.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub status: JobStatus,
    pub result: Option<String>,
}

/// Published on every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound(String),

    #[error("jobId is required in the body")]
    MissingId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyComplete,
}

impl MarkOutcome {
    pub fn message(self) -> &'static str {
        match self {
            MarkOutcome::Marked => "Job marked as complete.",
            MarkOutcome::AlreadyComplete => "Job already marked as complete.",
        }
    }
}

pub struct JobTracker {
    jobs: RwLock<HashMap<String, Job>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Register a new pending job and return its id.
    pub async fn create(&self) -> String {
        let id = new_job_id();
        let job = Job {
            status: JobStatus::Pending,
            result: None,
        };
        self.jobs.write().await.insert(id.clone(), job.clone());
        info!(job_id = %id, "job created");
        self.publish(&id, &job);
        id
    }

    /// Move a job to `status`. A job that already reached `complete` or
    /// `error` keeps that state; the write is dropped and `Ok(false)` returned.
    pub async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        result: Option<String>,
    ) -> Result<bool, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            warn!(
                job_id = id,
                current = ?job.status,
                requested = ?status,
                "job already finished, ignoring status change"
            );
            return Ok(false);
        }

        job.status = status;
        job.result = result;
        let snapshot = job.clone();
        drop(jobs);

        info!(job_id = id, status = ?status, "job status changed");
        self.publish(id, &snapshot);
        Ok(true)
    }

    pub async fn get(&self, id: &str) -> Result<Job, JobError> {
        if id.trim().is_empty() {
            return Err(JobError::MissingId);
        }
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Administrative override: force a job to `complete` without touching
    /// its result.
    pub async fn mark_complete(&self, id: &str) -> Result<MarkOutcome, JobError> {
        if id.trim().is_empty() {
            return Err(JobError::MissingId);
        }
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status == JobStatus::Complete {
            return Ok(MarkOutcome::AlreadyComplete);
        }
        job.status = JobStatus::Complete;
        let snapshot = job.clone();
        drop(jobs);

        info!(job_id = id, "job marked complete by external request");
        self.publish(id, &snapshot);
        Ok(MarkOutcome::Marked)
    }

    fn publish(&self, id: &str, job: &Job) {
        // No subscribers is fine.
        let _ = self.events.send(JobEvent {
            job_id: id.to_string(),
            status: job.status,
            result: job.result.clone(),
        });
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn new_job_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("job_{millis}_{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_job_is_pending() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;
        assert!(id.starts_with("job_"));
        assert_eq!(
            tracker.get(&id).await.unwrap(),
            Job {
                status: JobStatus::Pending,
                result: None
            }
        );
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let tracker = JobTracker::new();
        let a = tracker.create().await;
        let b = tracker.create().await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_ids_are_distinct() {
        let tracker = JobTracker::new();
        assert_eq!(
            tracker.get("job_never").await.unwrap_err(),
            JobError::NotFound("job_never".to_string())
        );
        assert_eq!(tracker.get("").await.unwrap_err(), JobError::MissingId);
        assert_eq!(
            tracker.mark_complete("job_never").await.unwrap_err(),
            JobError::NotFound("job_never".to_string())
        );
    }

    #[tokio::test]
    async fn test_terminal_state_is_sticky() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;
        assert!(tracker.set_status(&id, JobStatus::Running, None).await.unwrap());
        assert!(
            tracker
                .set_status(&id, JobStatus::Error, Some("boom".into()))
                .await
                .unwrap()
        );
        assert!(!tracker.set_status(&id, JobStatus::Complete, None).await.unwrap());

        let job = tracker.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.result.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_mark_complete_twice_keeps_result() {
        let tracker = JobTracker::new();
        let id = tracker.create().await;
        tracker
            .set_status(&id, JobStatus::Running, Some("half way".into()))
            .await
            .unwrap();

        assert_eq!(tracker.mark_complete(&id).await.unwrap(), MarkOutcome::Marked);
        assert_eq!(
            tracker.mark_complete(&id).await.unwrap(),
            MarkOutcome::AlreadyComplete
        );

        let job = tracker.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.result.as_deref(), Some("half way"));
    }

    #[tokio::test]
    async fn test_status_changes_are_published() {
        let tracker = JobTracker::new();
        let mut events = tracker.subscribe();
        let id = tracker.create().await;
        tracker.set_status(&id, JobStatus::Running, None).await.unwrap();

        assert_eq!(events.recv().await.unwrap().status, JobStatus::Pending);
        let running = events.recv().await.unwrap();
        assert_eq!(running.job_id, id);
        assert_eq!(running.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let tracker = std::sync::Arc::new(JobTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.create().await })
            })
            .collect();
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 16);
    }
}
