//! Host environment contract.
//!
//! Defines the interface to the surrounding host application, decoupling the
//! domain logic from the concrete host bindings. On cold start the host may
//! still be restoring its own contexts, so `list_live_contexts` can be
//! transiently incomplete; the reconciliation engine compensates with a
//! bounded retry loop.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A live execution context as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveContext {
    /// Host-assigned identifier; not stable across process restarts.
    pub context_id: String,
    /// Current navigation target of the context.
    pub navigation_target: String,
}

/// An abstract view of the host environment.
///
/// Implementations bind to the real host; tests substitute scripted doubles.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Lists the host's current live execution contexts.
    ///
    /// May be transiently incomplete shortly after process start, before the
    /// host has finished restoring its own state.
    ///
    /// # Errors
    ///
    /// Returns `SiloError::HostQuery` if the host reports an internal error
    /// rather than an (possibly empty) listing.
    async fn list_live_contexts(&self) -> Result<Vec<LiveContext>>;

    /// Asks the host to open a new execution context at the given navigation
    /// target. Returns the new context's id.
    ///
    /// # Errors
    ///
    /// Returns `SiloError::HostQuery` if the host cannot open the context.
    async fn open_context(&self, navigation_target: &str) -> Result<String>;
}
