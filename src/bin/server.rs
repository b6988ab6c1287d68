//! Process entrypoint: wires every component from [`AppConfig`] and serves
//! the HTTP surface until a shutdown signal arrives.

use std::sync::Arc;

use ml_inference_gateway::breaker::CircuitBreaker;
use ml_inference_gateway::config::AppConfig;
use ml_inference_gateway::coordinator::InferenceCoordinator;
use ml_inference_gateway::error::ServiceError;
use ml_inference_gateway::http::{build_router, AppState};
use ml_inference_gateway::jobs::JobManager;
use ml_inference_gateway::model::Model;
use ml_inference_gateway::monitoring::{DriftTracker, MetricsCollector};
use ml_inference_gateway::registry::ModelRegistry;
use ml_inference_gateway::scheduler::BatchScheduler;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!(service = %config.service_name, env = %config.env, "starting inference gateway");

    let registry = Arc::new(ModelRegistry::new(
        config.model_registry_path.clone(),
        config.default_model_version.clone(),
    ));

    let breaker = Arc::new(CircuitBreaker::<ServiceError>::new(
        config.breaker_failure_threshold,
        config.breaker_recovery_timeout,
    ));

    // One `CircuitBreaker::call` per `prediction_fn` invocation, and the
    // scheduler invokes this closure exactly once per batch — so however
    // many rows the scheduler fused together, the breaker sees exactly one
    // transaction, not one per coalesced caller. Registry failures surface
    // through `?` instead of being swallowed, so an `ArtifactMissing` stays
    // an `ArtifactMissing` all the way back to the HTTP layer.
    let scheduler_registry = Arc::clone(&registry);
    let scheduler_breaker = Arc::clone(&breaker);
    let prediction_fn: ml_inference_gateway::scheduler::PredictionFn = Arc::new(move |rows| {
        // Read the default fresh for every batch so a concurrent `promote`
        // is reflected the next time the worker runs, per the design's
        // snapshot-once-per-batch (not once-per-row) requirement.
        let version = scheduler_registry.default_version();
        scheduler_breaker
            .call(|| -> Result<Vec<_>, ServiceError> {
                let model = scheduler_registry.load(&version)?;
                Ok(model.predict(rows))
            })
            .map_err(ServiceError::from)
    });

    let scheduler = Arc::new(BatchScheduler::new(
        prediction_fn,
        config.max_batch_size,
        config.max_latency,
        config.max_queue_size,
    ));
    scheduler.start();

    let jobs = Arc::new(JobManager::new(
        config.jobs_dir.clone(),
        config.batch_max_workers,
        config.job_chunk_size,
        config.job_chunk_yield,
    )?);

    let drift = Arc::new(DriftTracker::new(config.drift_window, config.drift_threshold));
    let metrics = Arc::new(MetricsCollector::new(500));

    let service_name = config.service_name.clone();
    let env = config.env.clone();
    let port = config.port;

    let coordinator = Arc::new(InferenceCoordinator::new(
        config,
        registry,
        Arc::clone(&scheduler),
        breaker,
        jobs,
        drift,
        metrics,
    ));

    let state = AppState {
        coordinator,
        service_name,
        env,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "inference gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    tracing::info!("inference gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
