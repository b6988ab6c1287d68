//! Error types for the inference gateway.
//!
//! Each component owns a narrow error enum (mirroring the failure modes it
//! can actually produce); [`ServiceError`] is the crate-boundary type that
//! the HTTP surface maps to status codes per the external interface spec.

use thiserror::Error;

/// Errors raised by the [`crate::registry::ModelRegistry`].
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("model artifact not found for version {version}")]
    ArtifactMissing { version: String },

    #[error("refusing to unload the default version {version}")]
    CannotUnloadDefault { version: String },

    #[error("malformed model artifact for version {version}: {message}")]
    MalformedArtifact { version: String, message: String },
}

/// Errors raised entering or inside a [`crate::breaker::CircuitBreaker`]-guarded call.
#[derive(Debug, Clone, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker open")]
    Open,

    #[error(transparent)]
    Inner(#[from] E),
}

/// Errors raised by the [`crate::scheduler::BatchScheduler`].
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("scheduler queue is full")]
    QueueFull,

    #[error("scheduler stopped")]
    SchedulerStopped,

    #[error("batch scoring failed: {0}")]
    ScoringFailed(String),

    /// Surfaced verbatim from the prediction callback — a registry miss, a
    /// breaker trip, or any other upstream failure the callback reports.
    /// Kept distinct from `ScoringFailed` so the original error kind
    /// (`ArtifactMissing`, `BreakerOpen`, ...) survives the round trip back
    /// through the scheduler instead of flattening to an internal error.
    #[error(transparent)]
    Upstream(#[from] ServiceError),
}

/// Errors raised by the [`crate::jobs::JobManager`].
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("job {job_id} not found")]
    NotFound { job_id: String },

    #[error("job store I/O error: {0}")]
    Storage(String),
}

/// Errors raised while building an [`crate::config::AppConfig`] from the environment.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Crate-boundary error, returned by the [`crate::coordinator::InferenceCoordinator`]
/// and mapped to HTTP status codes by the `http` module.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("model artifact not found for version {version}")]
    NotFound { version: String },

    #[error("job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("cannot unload default version {version}")]
    CannotUnloadDefault { version: String },

    #[error("service overloaded: queue full")]
    QueueFull,

    #[error("service overloaded: circuit breaker open")]
    BreakerOpen,

    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ArtifactMissing { version } => ServiceError::NotFound { version },
            RegistryError::CannotUnloadDefault { version } => {
                ServiceError::CannotUnloadDefault { version }
            }
            RegistryError::MalformedArtifact { message, .. } => ServiceError::Internal(message),
        }
    }
}

impl From<SchedulerError> for ServiceError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::QueueFull => ServiceError::QueueFull,
            SchedulerError::SchedulerStopped => {
                ServiceError::Internal("scheduler stopped".to_string())
            }
            SchedulerError::ScoringFailed(message) => ServiceError::Internal(message),
            SchedulerError::Upstream(service_err) => service_err,
        }
    }
}

impl From<BreakerError<ServiceError>> for ServiceError {
    fn from(err: BreakerError<ServiceError>) -> Self {
        match err {
            BreakerError::Open => ServiceError::BreakerOpen,
            BreakerError::Inner(inner) => inner,
        }
    }
}

impl From<JobError> for ServiceError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound { job_id } => ServiceError::JobNotFound { job_id },
            JobError::Storage(message) => ServiceError::Internal(message),
        }
    }
}
