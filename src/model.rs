//! The `Model` abstraction and the bundled linear scorer.
//!
//! The registry and scheduler only depend on the [`Model`] trait; the
//! scoring math itself is out of scope for this design (any pure
//! `Batch[Row] -> Batch[Prediction]` function suffices). [`LinearModel`]
//! is the bundled reference implementation, grounded on the original
//! `ExampleModel`: a logistic regression over `bias + sum(w_i * x_i)`.

use std::fs;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RegistryError;
use crate::types::{FeatureRow, Prediction};

/// A versioned, callable scoring function.
///
/// Implementations must serialize concurrent calls on `predict` through
/// their own device lock — the registry and scheduler never assume a
/// model instance can run two batches at once.
pub trait Model: Send + Sync {
    /// The version this instance was loaded as.
    fn version(&self) -> &str;

    /// Score a batch of rows. `output.len() == input.len()`, order-preserving.
    fn predict(&self, rows: &[FeatureRow]) -> Vec<Prediction>;

    /// Feature schema and version, for admin introspection.
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            version: self.version().to_string(),
            features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelMetadata {
    pub version: String,
    pub features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    #[serde(default)]
    bias: f64,
    #[serde(default)]
    weights: std::collections::HashMap<String, f64>,
}

/// Logistic-regression scorer loaded from `<root>/<version>/model.json`.
///
/// Holds a device lock (`StdMutex<()>`) that serializes `predict` calls
/// across every caller — the scheduler worker and job-manager chunks
/// contend for this same lock, which is the resource the whole design
/// exists to share fairly.
pub struct LinearModel {
    version: String,
    bias: f64,
    weights: std::collections::HashMap<String, f64>,
    device: StdMutex<()>,
}

impl LinearModel {
    /// Load the artifact at `<root>/<version>/model.json`.
    pub fn load(root: &Path, version: &str) -> Result<Self, RegistryError> {
        let artifact_path = root.join(version).join("model.json");
        if !artifact_path.exists() {
            return Err(RegistryError::ArtifactMissing {
                version: version.to_string(),
            });
        }
        let contents = fs::read_to_string(&artifact_path).map_err(|e| {
            RegistryError::MalformedArtifact {
                version: version.to_string(),
                message: e.to_string(),
            }
        })?;
        let artifact: ArtifactFile =
            serde_json::from_str(&contents).map_err(|e| RegistryError::MalformedArtifact {
                version: version.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            version: version.to_string(),
            bias: artifact.bias,
            weights: artifact.weights,
            device: StdMutex::new(()),
        })
    }
}

impl Model for LinearModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, rows: &[FeatureRow]) -> Vec<Prediction> {
        // Simulate a GPU-shaped device call: fixed overhead plus a small
        // per-row cost, held for the whole batch under one lock acquisition.
        let _guard = self.device.lock().expect("device lock poisoned");
        let latency = Duration::from_millis(10) + Duration::from_micros(1_000 * rows.len() as u64);
        thread::sleep(latency);

        rows.iter()
            .map(|row| {
                let mut score = self.bias;
                for (name, weight) in &self.weights {
                    score += row.get(name).copied().unwrap_or(0.0) * weight;
                }
                let probability = 1.0 / (1.0 + (-score).exp());
                Prediction::from_probability(probability, self.version.clone())
            })
            .collect()
    }

    fn metadata(&self) -> ModelMetadata {
        let mut features: Vec<String> = self.weights.keys().cloned().collect();
        features.sort();
        ModelMetadata {
            version: self.version.clone(),
            features,
        }
    }
}
