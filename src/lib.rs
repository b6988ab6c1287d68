//! Versioned model-inference gateway.
//!
//! Ties together a [`registry::ModelRegistry`], a [`scheduler::BatchScheduler`]
//! that coalesces online requests into batches, a [`breaker::CircuitBreaker`]
//! that shields the scheduler from a persistently failing model, and a
//! [`jobs::JobManager`] for large offline runs — all fronted by
//! [`coordinator::InferenceCoordinator`].

pub mod breaker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod jobs;
pub mod model;
pub mod monitoring;
pub mod registry;
pub mod scheduler;
pub mod types;

#[cfg(feature = "http")]
pub mod http;

pub use coordinator::InferenceCoordinator;
pub use error::ServiceError;
