//! Environment-sourced application configuration.
//!
//! Mirrors the original `AppSettings.from_env()`: every knob has a
//! default, so the service boots with no environment at all. `.env` is
//! loaded (if present) via `dotenvy` before any variable is read.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub model_registry_path: PathBuf,
    pub default_model_version: String,
    pub service_name: String,

    pub batch_max_workers: usize,
    pub drift_window: usize,
    pub drift_threshold: f64,
    pub request_timeout: Duration,

    pub max_batch_size: usize,
    pub max_latency: Duration,
    pub max_queue_size: usize,

    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout: Duration,

    pub job_chunk_size: usize,
    pub job_chunk_yield: Duration,
    pub jobs_dir: PathBuf,

    pub port: u16,
}

impl AppConfig {
    /// Load `.env` (if present) and build a config from the process
    /// environment, falling back to the documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            env: env_or("APP_ENV", "dev"),
            model_registry_path: PathBuf::from(env_or("MODEL_REGISTRY_PATH", "config/model_store")),
            default_model_version: env_or("DEFAULT_MODEL_VERSION", "v1"),
            service_name: env_or("SERVICE_NAME", "ml-inference-gateway"),

            batch_max_workers: parse_env("BATCH_MAX_WORKERS", 2)?,
            drift_window: parse_env("DRIFT_WINDOW", 200)?,
            drift_threshold: parse_env("DRIFT_THRESHOLD", 0.15)?,
            request_timeout: Duration::from_secs_f64(parse_env("REQUEST_TIMEOUT_SECONDS", 2.0)?),

            max_batch_size: parse_env("MAX_BATCH_SIZE", 32)?,
            max_latency: Duration::from_millis(parse_env("MAX_LATENCY_MS", 10)?),
            max_queue_size: parse_env("MAX_QUEUE_SIZE", 1024)?,

            breaker_failure_threshold: parse_env("BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_recovery_timeout: Duration::from_secs_f64(parse_env(
                "BREAKER_RECOVERY_TIMEOUT_SECONDS",
                5.0,
            )?),

            job_chunk_size: parse_env("JOB_CHUNK_SIZE", 8)?,
            job_chunk_yield: Duration::from_millis(parse_env("JOB_CHUNK_YIELD_MS", 50)?),
            jobs_dir: PathBuf::from(env_or("JOBS_DIR", "data/jobs")),

            port: parse_env("PORT", 8001)?,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        // Run in isolation from the process environment: construct the
        // same defaults `from_env` would fall back to and sanity-check them.
        assert_eq!(parse_env::<usize>("ML_GATEWAY_TEST_UNSET_VAR", 32).unwrap(), 32);
    }

    #[test]
    fn invalid_numeric_value_is_reported() {
        std::env::set_var("ML_GATEWAY_TEST_BAD_INT", "not-a-number");
        let err = parse_env::<usize>("ML_GATEWAY_TEST_BAD_INT", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("ML_GATEWAY_TEST_BAD_INT");
    }
}
