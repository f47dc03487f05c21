//! Context ownership map.
//!
//! Ephemeral mapping from live execution-context identifiers to session ids.
//! Context identifiers are reassigned by the host on every restart, so this
//! map is rebuilt by the reconciliation engine, never read from durable
//! storage.

use std::collections::HashMap;

/// One owned context entry.
#[derive(Debug, Clone, PartialEq)]
struct OwnedContext {
    session_id: String,
    navigation_target: Option<String>,
}

/// In-memory map from live context ids to their owning session.
///
/// A context belongs to exactly one session at a time: attaching a context
/// already owned by a different session first detaches it from the old
/// owner. Re-attaching the same pair is a no-op.
#[derive(Debug, Default)]
pub struct ContextOwnershipMap {
    owners: HashMap<String, OwnedContext>,
}

impl ContextOwnershipMap {
    /// Creates an empty ownership map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `context_id` to `session_id`.
    ///
    /// Returns the id of the session the context was stolen from, if it was
    /// previously owned by a different session.
    pub fn attach(
        &mut self,
        context_id: &str,
        session_id: &str,
        navigation_target: Option<&str>,
    ) -> Option<String> {
        let previous = match self.owners.get(context_id) {
            Some(owned) if owned.session_id == session_id => None,
            Some(owned) => Some(owned.session_id.clone()),
            None => None,
        };

        self.owners.insert(
            context_id.to_string(),
            OwnedContext {
                session_id: session_id.to_string(),
                navigation_target: navigation_target.map(str::to_string),
            },
        );
        previous
    }

    /// Detaches a context. Returns the former owner's session id and the
    /// context's last known navigation target.
    pub fn detach(&mut self, context_id: &str) -> Option<(String, Option<String>)> {
        self.owners
            .remove(context_id)
            .map(|owned| (owned.session_id, owned.navigation_target))
    }

    /// Returns the owning session of a context, if any.
    pub fn owner_of(&self, context_id: &str) -> Option<&str> {
        self.owners
            .get(context_id)
            .map(|owned| owned.session_id.as_str())
    }

    /// Returns the number of live contexts owned by a session.
    pub fn live_context_count_for(&self, session_id: &str) -> usize {
        self.owners
            .values()
            .filter(|owned| owned.session_id == session_id)
            .count()
    }

    /// Returns the context ids owned by a session.
    pub fn contexts_of(&self, session_id: &str) -> Vec<&str> {
        self.owners
            .iter()
            .filter(|(_, owned)| owned.session_id == session_id)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Whether any context is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Total number of tracked contexts.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Drops every entry. Reconciliation rebuilds from empty.
    pub fn clear(&mut self) {
        self.owners.clear();
    }
}
