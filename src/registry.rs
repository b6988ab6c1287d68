//! Versioned model registry.
//!
//! All state lives behind one [`parking_lot::Mutex`]; `promote` acquires it
//! once and calls an internal `load_locked` helper rather than recursing
//! through the public `load` (parking_lot's mutex is not reentrant, so the
//! "reentrant mutex" requirement in the design is met by restructuring
//! instead of by a recursive lock).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::model::{LinearModel, Model};

struct RegistryState {
    cache: HashMap<String, Arc<dyn Model>>,
    default_version: String,
}

/// Loads, caches, unloads, and promotes versioned scoring functions.
pub struct ModelRegistry {
    root: PathBuf,
    state: Mutex<RegistryState>,
}

impl ModelRegistry {
    /// Create a registry rooted at `root`, with `default_version` as the
    /// initial default. The default is not eagerly loaded.
    pub fn new(root: impl Into<PathBuf>, default_version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(RegistryState {
                cache: HashMap::new(),
                default_version: default_version.into(),
            }),
        }
    }

    /// Idempotent load: returns the cached instance if present, otherwise
    /// locates and constructs the scorer from `<root>/<version>/model.json`.
    pub fn load(&self, version: &str) -> Result<Arc<dyn Model>, RegistryError> {
        let mut state = self.state.lock();
        self.load_locked(&mut state, version)
    }

    fn load_locked(
        &self,
        state: &mut RegistryState,
        version: &str,
    ) -> Result<Arc<dyn Model>, RegistryError> {
        if let Some(model) = state.cache.get(version) {
            return Ok(model.clone());
        }
        let model: Arc<dyn Model> = Arc::new(LinearModel::load(&self.root, version)?);
        state.cache.insert(version.to_string(), model.clone());
        info!(version, "model loaded");
        Ok(model)
    }

    /// Remove `version` from the cache. Refuses to unload the default.
    pub fn unload(&self, version: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        if state.default_version == version {
            return Err(RegistryError::CannotUnloadDefault {
                version: version.to_string(),
            });
        }
        state.cache.remove(version);
        info!(version, "model unloaded");
        Ok(())
    }

    /// Auto-load `version` if necessary, then atomically make it the default.
    pub fn promote(&self, version: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        self.load_locked(&mut state, version)?;
        let previous = std::mem::replace(&mut state.default_version, version.to_string());
        warn!(from = %previous, to = %version, "default model promoted");
        Ok(())
    }

    /// A single atomic read of the current default version.
    pub fn default_version(&self) -> String {
        self.state.lock().default_version.clone()
    }

    /// All currently cached (loaded) versions.
    pub fn loaded_versions(&self) -> Vec<String> {
        self.state.lock().cache.keys().cloned().collect()
    }
}
