//! Circuit breaker: a scoped guard around a protected call.
//!
//! Modeled as a higher-order wrapper (`call`) rather than an explicit
//! `check_enter`/`record_outcome` pair, since every call site in this
//! crate wraps a single synchronous closure; the contract (enter may
//! proceed or refuse, exit observes the outcome) is the same either way.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::BreakerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    /// Set when `open -> half_open` admits its one probe, cleared when that
    /// probe's outcome is recorded. Guards the half-open singularity: a
    /// second concurrent `check_enter` during the same half-open window
    /// must be refused, not let through alongside the first probe.
    half_open_probe_in_flight: bool,
}

/// Guard parameters: trip after `failure_threshold` consecutive expected
/// failures, reopen for probing after `recovery_timeout`. `is_expected`
/// classifies which errors count toward tripping the breaker — this
/// mirrors the `expected_exception_types` tuple in the original design.
pub struct CircuitBreaker<E> {
    failure_threshold: u32,
    recovery_timeout: Duration,
    is_expected: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    inner: Mutex<Inner>,
}

impl<E> CircuitBreaker<E> {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self::with_classifier(failure_threshold, recovery_timeout, |_| true)
    }

    pub fn with_classifier(
        failure_threshold: u32,
        recovery_timeout: Duration,
        is_expected: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            is_expected: Arc::new(is_expected),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Enter the guarded region, run `f`, and record the outcome before
    /// returning. `BreakerError::Open` is raised without running `f` at
    /// all; any other error from `f` passes through unchanged.
    pub fn call<T>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        self.check_enter()?;
        let outcome = f();
        self.record_outcome(outcome.as_ref().err());
        outcome.map_err(BreakerError::Inner)
    }

    /// Whether entry is currently permitted, transitioning `open -> half_open`
    /// when the recovery timeout has elapsed. Exposed directly (alongside
    /// [`Self::record_success`] / [`Self::record_failure`]) for call sites
    /// that span an `await` and so cannot hand the guarded work to `call`
    /// as a single synchronous closure.
    pub fn check_enter(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                } else {
                    Err(BreakerError::Open)
                }
            }
            // Only the caller that flipped open->half_open gets to probe;
            // anyone arriving while that probe is still outstanding is
            // refused, same as if the breaker were still open.
            BreakerState::HalfOpen if inner.half_open_probe_in_flight => Err(BreakerError::Open),
            BreakerState::HalfOpen => {
                inner.half_open_probe_in_flight = true;
                Ok(())
            }
            BreakerState::Closed => Ok(()),
        }
    }

    pub fn record_success(&self) {
        self.record_outcome(None);
    }

    pub fn record_failure(&self, err: &E) {
        self.record_outcome(Some(err));
    }

    fn record_outcome(&self, err: Option<&E>) {
        let mut inner = self.inner.lock();
        inner.half_open_probe_in_flight = false;
        match err {
            Some(e) if (self.is_expected)(e) => {
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(Instant::now());
                match inner.state {
                    BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open),
                    BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                        self.transition(&mut inner, BreakerState::Open)
                    }
                    _ => {}
                }
            }
            _ => {
                inner.consecutive_failures = 0;
                if inner.state == BreakerState::HalfOpen {
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        if inner.state != to {
            warn!(from = ?inner.state, to = ?to, failures = inner.consecutive_failures, "circuit breaker state change");
            inner.state = to;
        }
    }
}
