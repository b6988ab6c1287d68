//! In-process counters and latency percentile tracking.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Serialize;

struct State {
    counters: HashMap<String, u64>,
    latencies: HashMap<String, VecDeque<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub p50: f64,
    pub p95: f64,
}

/// Tracks request counters and latency histograms for the service.
pub struct MetricsCollector {
    latency_window: usize,
    state: parking_lot::Mutex<State>,
}

impl MetricsCollector {
    pub fn new(latency_window: usize) -> Self {
        Self {
            latency_window: latency_window.max(1),
            state: parking_lot::Mutex::new(State {
                counters: HashMap::new(),
                latencies: HashMap::new(),
            }),
        }
    }

    pub fn increment(&self, name: &str) {
        let mut state = self.state.lock();
        *state.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn observe_latency(&self, name: &str, seconds: f64) {
        let mut state = self.state.lock();
        let window = self.latency_window;
        let buffer = state
            .latencies
            .entry(name.to_string())
            .or_insert_with(|| VecDeque::with_capacity(window));
        buffer.push_back(seconds);
        if buffer.len() > window {
            buffer.pop_front();
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.state.lock().counters.get(name).copied().unwrap_or(0)
    }

    pub fn summary(&self, name: &str) -> LatencySummary {
        let state = self.state.lock();
        let mut values: Vec<f64> = state
            .latencies
            .get(name)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        if values.is_empty() {
            return LatencySummary {
                count: 0,
                p50: 0.0,
                p95: 0.0,
            };
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        LatencySummary {
            count: values.len(),
            p50: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
        }
    }
}

/// Linear-interpolated percentile over an already-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() - 1) as f64 * (q / 100.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new(100);
        metrics.increment("request_total");
        metrics.increment("request_total");
        assert_eq!(metrics.counter("request_total"), 2);
    }

    #[test]
    fn summary_reports_count_and_percentiles() {
        let metrics = MetricsCollector::new(100);
        for ms in [10.0, 20.0, 30.0, 40.0, 50.0] {
            metrics.observe_latency("inference_latency", ms);
        }
        let summary = metrics.summary("inference_latency");
        assert_eq!(summary.count, 5);
        assert!((summary.p50 - 30.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let metrics = MetricsCollector::new(100);
        let summary = metrics.summary("nothing-observed");
        assert_eq!(summary.count, 0);
        assert_eq!(summary.p50, 0.0);
    }

    #[test]
    fn window_bounds_retained_samples() {
        let metrics = MetricsCollector::new(3);
        for i in 0..10 {
            metrics.observe_latency("x", i as f64);
        }
        let summary = metrics.summary("x");
        assert_eq!(summary.count, 3);
    }
}
