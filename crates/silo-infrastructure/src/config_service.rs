//! Configuration service implementation.
//!
//! This module provides a ConfigService that loads the Silo configuration
//! from the configuration file (`<config_dir>/silo/config.toml`).

use crate::paths::SiloPaths;
use serde::{Deserialize, Serialize};
use silo_core::error::Result;
use silo_core::reconcile::ReconcileConfig;
use silo_core::retention::RetentionConfig;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Root configuration for the subsystem.
///
/// Every field has a default, so a missing or partial file never blocks
/// startup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SiloConfig {
    /// Retention windows per tier.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Cold-start reconciliation timing.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Configuration service that loads and caches the root configuration.
///
/// The file is read lazily on first access and cached to avoid repeated
/// I/O; `invalidate_cache` forces a reload on the next access.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<SiloConfig>>>,
}

impl ConfigService {
    /// Creates a ConfigService reading from `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a ConfigService at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform config directory cannot be
    /// determined.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(SiloPaths::config_path()?))
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn get_config(&self) -> SiloConfig {
        {
            let read_lock = self.config.read().unwrap();
            if let Some(ref cached) = *read_lock {
                return cached.clone();
            }
        }

        let loaded = self.load_config().unwrap_or_default();

        {
            let mut write_lock = self.config.write().unwrap();
            *write_lock = Some(loaded.clone());
        }

        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap();
        *write_lock = None;
    }

    fn load_config(&self) -> Option<SiloConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return None,
        };

        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(
                    "ignoring malformed config at {}: {}",
                    self.path.display(),
                    err
                );
                None
            }
        }
    }
}
