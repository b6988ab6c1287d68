//! Sliding-window mean-drift detection.
//!
//! Each feature gets its own fixed-size ring buffer. Once the buffer
//! fills for the first time, its mean becomes that feature's baseline;
//! every subsequent full window is compared against the baseline, and a
//! relative deviation at or past `threshold` is reported as a signal.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DriftSignal {
    pub feature: String,
    pub baseline_mean: f64,
    pub current_mean: f64,
    pub drift_score: f64,
}

struct FeatureWindow {
    buffer: VecDeque<f64>,
    baseline: Option<f64>,
}

pub struct DriftTracker {
    window_size: usize,
    threshold: f64,
    windows: parking_lot::Mutex<HashMap<String, FeatureWindow>>,
}

impl DriftTracker {
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self {
            window_size: window_size.max(1),
            threshold,
            windows: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Feed a batch of named numeric observations, returning any drift
    /// signals produced by features whose window just filled.
    pub fn update(&self, features: &HashMap<String, f64>) -> Vec<DriftSignal> {
        let mut windows = self.windows.lock();
        let mut signals = Vec::new();

        for (name, &value) in features {
            let window = windows.entry(name.clone()).or_insert_with(|| FeatureWindow {
                buffer: VecDeque::with_capacity(self.window_size),
                baseline: None,
            });

            window.buffer.push_back(value);
            if window.buffer.len() > self.window_size {
                window.buffer.pop_front();
            }

            if window.buffer.len() < self.window_size {
                continue;
            }

            let current_mean = mean(&window.buffer);
            match window.baseline {
                None => window.baseline = Some(current_mean),
                Some(baseline_mean) => {
                    if baseline_mean == 0.0 {
                        continue;
                    }
                    let drift_score = (current_mean - baseline_mean).abs() / baseline_mean.abs();
                    if drift_score >= self.threshold {
                        signals.push(DriftSignal {
                            feature: name.clone(),
                            baseline_mean,
                            current_mean,
                            drift_score,
                        });
                    }
                }
            }
        }

        signals
    }
}

fn mean(values: &VecDeque<f64>) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: f64) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("x".to_string(), value);
        m
    }

    #[test]
    fn no_signal_until_window_fills_twice() {
        let tracker = DriftTracker::new(3, 0.1);
        for _ in 0..3 {
            assert!(tracker.update(&row(1.0)).is_empty());
        }
    }

    #[test]
    fn signals_once_current_mean_diverges_past_threshold() {
        let tracker = DriftTracker::new(3, 0.1);
        for _ in 0..3 {
            tracker.update(&row(1.0));
        }
        tracker.update(&row(10.0));
        tracker.update(&row(10.0));
        let signals = tracker.update(&row(10.0));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].feature, "x");
        assert!((signals[0].baseline_mean - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stable_values_never_signal() {
        let tracker = DriftTracker::new(4, 0.05);
        for _ in 0..20 {
            assert!(tracker.update(&row(5.0)).is_empty());
        }
    }
}
