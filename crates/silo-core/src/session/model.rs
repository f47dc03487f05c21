//! Session domain model.
//!
//! This module contains the core Session entity that represents one isolated
//! browsing identity in the subsystem's domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix under which session records are persisted in the durable store.
pub const SESSION_KEY_PREFIX: &str = "session/";

/// Returns the durable-store key for a session id.
pub fn session_key(id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

/// Licensing tier of a session, fixed at creation time.
///
/// Tier upgrades do not retroactively change existing sessions; a session
/// keeps its creation-time tier unless explicitly migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    /// Whether this tier may assign custom display names.
    pub fn allows_rename(&self) -> bool {
        matches!(self, Self::Premium | Self::Enterprise)
    }

    /// Static name used in error reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Owns at least one live execution context.
    Active,
    /// Zero live contexts, preserved for manual reopening.
    Dormant,
    /// Marked for removal by retention policy; physically removed on the
    /// next compaction pass.
    PendingDeletion,
}

/// Represents one isolated browsing identity.
///
/// A session owns:
/// - Display attributes (color, optional validated name)
/// - A lifecycle status driven by its live-context count
/// - An origin-scoped credential store, never shared across sessions
/// - For enterprise sessions, the last-known navigation targets of formerly
///   owned contexts, persisted to drive automatic re-attachment after restart
///
/// This is the "pure" domain model that business logic operates on,
/// independent of any specific storage format. The ephemeral context
/// ownership mapping is deliberately absent: context identifiers are
/// reassigned by the host on every restart, so ownership is rebuilt, never
/// restored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier (UUID format), immutable.
    pub id: String,
    /// Licensing tier captured at creation time.
    pub tier: Tier,
    /// Display color in `#RRGGBB` form.
    pub display_color: String,
    /// Optional validated display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Updated whenever a context is attached or the credential store is
    /// written, whichever happened last.
    pub last_seen_at: DateTime<Utc>,
    /// Credential entries keyed by origin, then by credential key.
    #[serde(default)]
    pub credential_entries: HashMap<String, HashMap<String, String>>,
    /// Enterprise only: last-known navigation targets of formerly owned
    /// contexts, used for AutoRestore matching after restart.
    #[serde(default)]
    pub restore_targets: Vec<String>,
}

impl Session {
    /// Creates a new dormant session with the given tier and color.
    pub fn new(tier: Tier, display_color: String, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tier,
            display_color,
            display_name: None,
            status: SessionStatus::Dormant,
            created_at: now,
            last_seen_at: now,
            credential_entries: HashMap::new(),
            restore_targets: Vec::new(),
        }
    }

    /// Returns the durable-store key for this session.
    pub fn store_key(&self) -> String {
        session_key(&self.id)
    }
}
