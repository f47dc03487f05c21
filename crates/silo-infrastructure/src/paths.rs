//! Unified path management for Silo storage and configuration.
//!
//! All durable state lives under the platform config directory so the store
//! survives process restarts wherever the host keeps its own profile data.
//!
//! # Directory Structure
//!
//! ```text
//! <config_dir>/silo/           # e.g. ~/.config/silo/ on Linux
//! ├── config.toml              # Retention and reconciliation tuning
//! └── store.json               # Durable store document
//! ```

use silo_core::error::{Result, SiloError};
use std::path::PathBuf;

/// Unified path resolution for Silo.
pub struct SiloPaths;

impl SiloPaths {
    /// Returns the Silo configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform config directory cannot be
    /// determined.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("silo"))
            .ok_or_else(|| SiloError::internal("cannot determine platform config directory"))
    }

    /// Returns the durable store document path.
    pub fn store_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("store.json"))
    }

    /// Returns the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
