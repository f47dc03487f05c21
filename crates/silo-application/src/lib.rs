//! Application layer for Silo.
//!
//! This crate wires the domain components into the facade external
//! collaborators consume: the credential-injection layer and the UI read
//! sessions and ownership through it, the host delivers context and
//! process lifecycle events into it.

pub mod service;

pub use service::{SessionFilter, SessionService};
