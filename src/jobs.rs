//! Job manager for offline (batch) inference runs.
//!
//! Jobs are dispatched onto a bounded worker pool (a [`tokio::sync::Semaphore`]
//! standing in for the original's `ThreadPoolExecutor`), persisted as one
//! JSON file per job with read-merge-write semantics, and executed in
//! small chunks with a yield between them so a long offline run never
//! monopolizes a model's device lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::JobError;

/// Default chunk size and inter-chunk yield, per the design's fairness knobs.
pub const DEFAULT_CHUNK_SIZE: usize = 8;
pub const DEFAULT_CHUNK_YIELD: Duration = Duration::from_millis(50);

/// Dispatches and tracks offline jobs, persisting state under `jobs_dir`.
pub struct JobManager {
    jobs_dir: PathBuf,
    semaphore: Arc<Semaphore>,
    chunk_size: usize,
    chunk_yield: Duration,
}

impl JobManager {
    pub fn new(
        jobs_dir: impl Into<PathBuf>,
        max_workers: usize,
        chunk_size: usize,
        chunk_yield: Duration,
    ) -> std::io::Result<Self> {
        let jobs_dir = jobs_dir.into();
        std::fs::create_dir_all(&jobs_dir)?;
        Ok(Self {
            jobs_dir,
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            chunk_size: chunk_size.max(1),
            chunk_yield,
        })
    }

    /// Dispatch `job_fn` onto the worker pool and return its job id
    /// immediately; the job runs to completion in the background.
    ///
    /// `job_fn` receives the chunk size and yield interval so it can
    /// honor the chunked-fairness contract while scoring.
    pub fn submit<F>(&self, job_fn: F) -> String
    where
        F: FnOnce(usize, Duration) -> Result<Value, String> + Send + 'static,
    {
        let job_id = Uuid::new_v4().to_string();
        self.write_state(&job_id, &[("status", json!("pending"))]);

        let jobs_dir = self.jobs_dir.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let chunk_size = self.chunk_size;
        let chunk_yield = self.chunk_yield;
        let id_for_task = job_id.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            write_state_to(&jobs_dir, &id_for_task, &[("status", json!("running"))]);

            let outcome =
                tokio::task::spawn_blocking(move || job_fn(chunk_size, chunk_yield)).await;

            match outcome {
                Ok(Ok(result)) => {
                    write_state_to(
                        &jobs_dir,
                        &id_for_task,
                        &[("status", json!("completed")), ("result", result)],
                    );
                }
                Ok(Err(message)) => {
                    error!(job_id = %id_for_task, error = %message, "batch job failed");
                    write_state_to(
                        &jobs_dir,
                        &id_for_task,
                        &[("status", json!("failed")), ("error", json!(message))],
                    );
                }
                Err(join_err) => {
                    error!(job_id = %id_for_task, error = %join_err, "batch job panicked");
                    write_state_to(
                        &jobs_dir,
                        &id_for_task,
                        &[
                            ("status", json!("failed")),
                            ("error", json!(join_err.to_string())),
                        ],
                    );
                }
            }
        });

        info!(job_id = %job_id, "batch job submitted");
        job_id
    }

    /// Current status string, or an error if no record exists for `job_id`.
    pub fn status(&self, job_id: &str) -> Result<String, JobError> {
        let state = self.load_state(job_id)?;
        Ok(state
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// The job's result payload, present only once `status == "completed"`.
    pub fn result(&self, job_id: &str) -> Result<Option<Value>, JobError> {
        let state = self.load_state(job_id)?;
        if state.get("status").and_then(Value::as_str) == Some("completed") {
            Ok(state.get("result").cloned())
        } else {
            Ok(None)
        }
    }

    fn load_state(&self, job_id: &str) -> Result<Value, JobError> {
        let path = self.jobs_dir.join(format!("{job_id}.json"));
        if !path.exists() {
            return Err(JobError::NotFound {
                job_id: job_id.to_string(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| JobError::Storage(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| JobError::Storage(e.to_string()))
    }

    fn write_state(&self, job_id: &str, updates: &[(&str, Value)]) {
        write_state_to(&self.jobs_dir, job_id, updates);
    }
}

/// Read-merge-write a job's state file. Free function (rather than a
/// method) so it can run from inside a spawned task without borrowing
/// the manager.
fn write_state_to(jobs_dir: &std::path::Path, job_id: &str, updates: &[(&str, Value)]) {
    let path = jobs_dir.join(format!("{job_id}.json"));
    let mut current: HashMap<String, Value> = std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    for (key, value) in updates {
        current.insert((*key).to_string(), value.clone());
    }
    current.insert(
        "updated_at".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );

    match serde_json::to_string(&current) {
        Ok(payload) => {
            if let Err(e) = std::fs::write(&path, payload) {
                error!(job_id, error = %e, "failed to persist job state");
            }
        }
        Err(e) => error!(job_id, error = %e, "failed to serialize job state"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            JobManager::new(dir.path(), 2, DEFAULT_CHUNK_SIZE, Duration::from_millis(1)).unwrap();

        let job_id = manager.submit(|_chunk_size, _yield_for| Ok(json!({"value": 42})));

        let mut status = manager.status(&job_id).unwrap();
        for _ in 0..50 {
            if status == "completed" || status == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = manager.status(&job_id).unwrap();
        }

        assert_eq!(status, "completed");
        let result = manager.result(&job_id).unwrap().unwrap();
        assert_eq!(result["value"], 42);
    }

    #[tokio::test]
    async fn failed_job_is_recorded_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            JobManager::new(dir.path(), 1, DEFAULT_CHUNK_SIZE, Duration::from_millis(1)).unwrap();

        let job_id = manager.submit(|_, _| Err("boom".to_string()));

        let mut status = manager.status(&job_id).unwrap();
        for _ in 0..50 {
            if status == "completed" || status == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = manager.status(&job_id).unwrap();
        }

        assert_eq!(status, "failed");
        assert!(manager.result(&job_id).unwrap().is_none());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            JobManager::new(dir.path(), 1, DEFAULT_CHUNK_SIZE, Duration::from_millis(1)).unwrap();
        let err = manager.status("does-not-exist").unwrap_err();
        assert!(matches!(err, JobError::NotFound { .. }));
    }
}
