//! Error types for the Silo subsystem.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the entire Silo subsystem.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait. Every variant is recoverable
/// at the subsystem level: failures degrade to "session preserved as dormant",
/// never to data loss.
#[derive(Error, Debug, Clone, Serialize)]
pub enum SiloError {
    /// Display attribute rejected before any mutation took place.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Display name collides case-insensitively with an existing session.
    #[error("Duplicate session name: '{0}'")]
    DuplicateName(String),

    /// Operation gated behind a higher licensing tier.
    #[error("Tier '{tier}' does not permit {operation}")]
    TierForbidden {
        tier: &'static str,
        operation: &'static str,
    },

    /// Durable write failed; in-memory state was not advanced.
    #[error("Durable store unavailable: {0}")]
    StoreUnavailable(String),

    /// The host environment failed to answer a context query.
    #[error("Host query error: {0}")]
    HostQuery(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Session already owns at least one live context.
    #[error("Session '{0}' is already active")]
    AlreadyActive(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SiloError {
    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a DuplicateName error
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Creates a TierForbidden error
    pub fn tier_forbidden(tier: &'static str, operation: &'static str) -> Self {
        Self::TierForbidden { tier, operation }
    }

    /// Creates a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a HostQuery error
    pub fn host_query(message: impl Into<String>) -> Self {
        Self::HostQuery(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a DuplicateName error
    pub fn is_duplicate_name(&self) -> bool {
        matches!(self, Self::DuplicateName(_))
    }

    /// Check if this is a TierForbidden error
    pub fn is_tier_forbidden(&self) -> bool {
        matches!(self, Self::TierForbidden { .. })
    }

    /// Check if this is a StoreUnavailable error
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for SiloError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for SiloError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, SiloError>`.
pub type Result<T> = std::result::Result<T, SiloError>;
