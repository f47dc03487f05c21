//! Core domain layer for Silo.
//!
//! Silo manages isolated sessions inside a long-running host application
//! that can be suspended or killed at any point. Each session owns an
//! isolated, origin-scoped credential store and a variable set of host
//! execution contexts. This crate holds the parts with real invariants:
//! the session registry, the ephemeral context ownership map, the tiered
//! retention policy, the cold-start reconciliation engine, and the durable
//! store contract that makes them crash-consistent.

pub mod context;
pub mod error;
pub mod host;
pub mod reconcile;
pub mod retention;
pub mod session;
pub mod store;

// Re-export common error type
pub use error::{Result, SiloError};
