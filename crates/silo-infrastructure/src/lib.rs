//! Infrastructure layer for Silo.
//!
//! This crate provides the concrete persistence and configuration backends
//! behind the contracts defined in `silo-core`: an atomic JSON file store
//! for the crash-durable tier, an in-memory store for tests and embedding,
//! platform path resolution, and the TOML configuration service.

pub mod atomic_file;
pub mod config_service;
pub mod file_store;
pub mod memory_store;
pub mod paths;

pub use atomic_file::AtomicJsonFile;
pub use config_service::{ConfigService, SiloConfig};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use paths::SiloPaths;
