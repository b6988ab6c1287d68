//! Orchestrates the online and offline inference paths.
//!
//! The coordinator is the single entry point the HTTP surface talks to:
//! it resolves versions, picks the scheduler-coalesced path or the
//! direct path, feeds the drift tracker and metrics collector, and
//! converts every component's error into one [`ServiceError`].
//!
//! The breaker guards the direct path here (one call, one breaker
//! transaction) but is deliberately *not* entered per row on the
//! coalesced path: the scheduler fuses independent callers' rows into
//! one `F()` invocation, so the breaker belongs inside that shared
//! `PredictionFn` closure (built alongside the scheduler — see
//! `src/bin/server.rs`), where exactly one `call` corresponds to exactly
//! one batch. Guarding it here instead would record one breaker failure
//! per coalesced caller instead of per actual device invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::jobs::JobManager;
use crate::model::{Model, ModelMetadata};
use crate::monitoring::{DriftTracker, MetricsCollector};
use crate::registry::ModelRegistry;
use crate::scheduler::BatchScheduler;
use crate::types::{FeatureRow, Prediction};

/// The outcome of an online `predict` call, ready to serialize as-is.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
    pub version: String,
    pub latency_ms: f64,
}

pub struct InferenceCoordinator {
    config: AppConfig,
    registry: Arc<ModelRegistry>,
    scheduler: Arc<BatchScheduler>,
    breaker: Arc<CircuitBreaker<ServiceError>>,
    jobs: Arc<JobManager>,
    drift: Arc<DriftTracker>,
    metrics: Arc<MetricsCollector>,
}

impl InferenceCoordinator {
    pub fn new(
        config: AppConfig,
        registry: Arc<ModelRegistry>,
        scheduler: Arc<BatchScheduler>,
        breaker: Arc<CircuitBreaker<ServiceError>>,
        jobs: Arc<JobManager>,
        drift: Arc<DriftTracker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            registry,
            scheduler,
            breaker,
            jobs,
            drift,
            metrics,
        }
    }

    /// Score `rows` under `version` (or the current default), coalescing
    /// through the scheduler when `version` is the live default.
    pub async fn predict(
        &self,
        rows: Vec<FeatureRow>,
        version: Option<String>,
    ) -> Result<PredictResponse, ServiceError> {
        let start = Instant::now();
        self.metrics.increment("request_total");

        // Snapshotting the default once means every row in this batch
        // takes the same path even if another caller promotes concurrently.
        let default_version = self.registry.default_version();
        let resolved_version = version.unwrap_or_else(|| default_version.clone());

        let predictions = if resolved_version == default_version {
            self.predict_via_scheduler(rows.clone()).await?
        } else {
            self.predict_direct(&resolved_version, &rows)?
        };

        let latency = start.elapsed();
        self.metrics.observe_latency("inference_latency", latency.as_secs_f64());

        for row in &rows {
            let signals = self.drift.update(row);
            for signal in signals {
                warn!(
                    feature = signal.feature,
                    drift_score = signal.drift_score,
                    baseline_mean = signal.baseline_mean,
                    current_mean = signal.current_mean,
                    "drift detected"
                );
            }
        }

        Ok(PredictResponse {
            predictions,
            version: resolved_version,
            latency_ms: latency.as_secs_f64() * 1000.0,
        })
    }

    async fn predict_via_scheduler(
        &self,
        rows: Vec<FeatureRow>,
    ) -> Result<Vec<Prediction>, ServiceError> {
        let scheduler = Arc::clone(&self.scheduler);

        // One `tokio::spawn` per row, fanned out to the scheduler; many of
        // these rows may be coalesced into the same `F()` call and thus
        // share the same breaker transaction recorded inside that call —
        // nothing breaker-related happens at this per-request layer.
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let scheduler = Arc::clone(&scheduler);
            handles.push(tokio::spawn(async move { scheduler.predict(row).await }));
        }

        let mut predictions = Vec::with_capacity(handles.len());
        let mut first_error: Option<ServiceError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(prediction)) => predictions.push(prediction),
                Ok(Err(scheduler_err)) => {
                    first_error.get_or_insert(ServiceError::from(scheduler_err));
                }
                Err(join_err) => {
                    first_error.get_or_insert(ServiceError::Internal(join_err.to_string()));
                }
            }
        }

        if let Some(err) = first_error {
            self.metrics.increment("errors");
            return Err(err);
        }
        Ok(predictions)
    }

    /// Score `rows` against a specific, non-default version directly
    /// (no coalescing). This is a single call, so it maps onto exactly
    /// one breaker transaction the same way the scheduler's `F()` does.
    fn predict_direct(
        &self,
        version: &str,
        rows: &[FeatureRow],
    ) -> Result<Vec<Prediction>, ServiceError> {
        let registry = &self.registry;
        self.breaker
            .call(|| -> Result<Vec<Prediction>, ServiceError> {
                let model = registry.load(version)?;
                Ok(model.predict(rows))
            })
            .map_err(|e| {
                self.metrics.increment("errors");
                ServiceError::from(e)
            })
    }

    /// Dispatch `rows` to the job manager, scoring in chunks so the
    /// device lock is yielded between them.
    pub fn enqueue_batch(&self, rows: Vec<FeatureRow>, version: Option<String>) -> String {
        let registry = Arc::clone(&self.registry);
        let default_version = self.registry.default_version();
        let resolved_version = version.unwrap_or(default_version);

        self.jobs.submit(move |chunk_size, chunk_yield| {
            let model = registry
                .load(&resolved_version)
                .map_err(|e| e.to_string())?;

            let mut all_predictions = Vec::with_capacity(rows.len());
            for (i, chunk) in rows.chunks(chunk_size).enumerate() {
                all_predictions.extend(model.predict(chunk));
                if i > 0 || chunk.len() == chunk_size {
                    std::thread::sleep(chunk_yield);
                }
            }

            Ok(json!({
                "predictions": all_predictions,
                "version": resolved_version,
            }))
        })
    }

    pub fn batch_status(&self, job_id: &str) -> Result<Value, ServiceError> {
        let status = self.jobs.status(job_id)?;
        let result = self.jobs.result(job_id)?;
        let mut payload = json!({ "job_id": job_id, "status": status });
        if let Some(result) = result {
            payload["result"] = result;
        }
        Ok(payload)
    }

    pub fn health(&self) -> Value {
        let default_version = self.registry.default_version();
        let status = match self.registry.load(&default_version) {
            Ok(_) => "ready",
            Err(_) => "degraded",
        };
        json!({
            "status": status,
            "default_model": default_version,
            "env": self.config.env,
        })
    }

    pub fn list_models(&self) -> Value {
        json!({
            "loaded_versions": self.registry.loaded_versions(),
            "default_version": self.registry.default_version(),
        })
    }

    pub fn load_model(&self, version: &str) -> Result<ModelMetadata, ServiceError> {
        let model = self.registry.load(version)?;
        Ok(model.metadata())
    }

    pub fn promote_model(&self, version: &str) -> Result<(), ServiceError> {
        self.registry.promote(version)?;
        Ok(())
    }

    pub fn unload_model(&self, version: &str) -> Result<(), ServiceError> {
        self.registry.unload(version)?;
        Ok(())
    }

    pub fn metrics_summary(&self) -> HashMap<&'static str, Value> {
        let mut summary = HashMap::new();
        summary.insert(
            "inference_latency",
            serde_json::to_value(self.metrics.summary("inference_latency")).unwrap(),
        );
        summary.insert("request_total", json!(self.metrics.counter("request_total")));
        summary.insert("errors", json!(self.metrics.counter("errors")));
        summary
    }
}
