//! Core data types shared across the registry, scheduler, and coordinator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An unordered mapping from feature name to numeric value.
///
/// Immutable once accepted: nothing downstream of deserialization mutates
/// a row in place, only reads from it.
pub type FeatureRow = HashMap<String, f64>;

/// A scored prediction produced 1:1 from a [`FeatureRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub label: u8,
    pub version: String,
    pub confidence: f64,
}

impl Prediction {
    /// Build a prediction from a raw logistic score, following the
    /// artifact format's `label = 1 iff probability >= 0.5` rule.
    pub fn from_probability(probability: f64, version: impl Into<String>) -> Self {
        let label = if probability >= 0.5 { 1 } else { 0 };
        let confidence = (2.0 * probability - 1.0).abs();
        Self {
            probability,
            label,
            version: version.into(),
            confidence,
        }
    }
}
