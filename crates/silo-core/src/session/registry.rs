//! Session registry.
//!
//! Owns the session records and their lifecycle. Every mutating operation
//! commits synchronously through the durable store before the in-memory view
//! advances; the registry never holds an uncommitted state visible to other
//! components. A failed commit leaves the registry exactly as it was and
//! surfaces `StoreUnavailable` to the caller.

use super::model::{SESSION_KEY_PREFIX, Session, SessionStatus, Tier, session_key};
use super::name::{name_comparison_key, normalize_display_name, validate_display_color};
use crate::error::{Result, SiloError};
use crate::store::{DurableStore, StoreOp};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages session records and their lifecycle.
///
/// `SessionRegistry` is responsible for:
/// - Creating sessions with their creation-time tier
/// - Validating and applying display attribute changes
/// - Status transitions (active / dormant / pending deletion)
/// - The per-session, origin-scoped credential store
/// - Physical removal of expired sessions via compaction
pub struct SessionRegistry {
    /// Durable storage backend; written before any in-memory update.
    store: Arc<dyn DurableStore>,
    /// In-memory view of the last committed state.
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    /// Loads the registry from the durable store.
    ///
    /// Called once on process start. The in-memory view is rebuilt from the
    /// durable tier; nothing from a previous process lifetime is trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a record fails to
    /// deserialize.
    pub async fn load(store: Arc<dyn DurableStore>) -> Result<Self> {
        let mut sessions = HashMap::new();
        for (_key, value) in store.scan(SESSION_KEY_PREFIX).await? {
            let session: Session = serde_json::from_value(value)?;
            tracing::debug!("loaded session {} ({:?})", session.id, session.status);
            sessions.insert(session.id.clone(), session);
        }

        tracing::info!("session registry loaded with {} sessions", sessions.len());
        Ok(Self {
            store,
            sessions: RwLock::new(sessions),
        })
    }

    /// Creates a new dormant session.
    ///
    /// The tier is captured from the caller's current licensing value and is
    /// fixed for the session's lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed color, `StoreUnavailable` if the
    /// durable write fails.
    pub async fn create(&self, tier: Tier, display_color: &str) -> Result<Session> {
        validate_display_color(display_color)?;

        let session = Session::new(tier, display_color.to_string(), Utc::now());

        let mut sessions = self.sessions.write().await;
        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session.clone());

        tracing::info!("created session {} (tier {})", session.id, tier.as_str());
        Ok(session)
    }

    /// Renames a session.
    ///
    /// The new name is trimmed, whitespace-collapsed, length-checked in
    /// grapheme units, and checked for case-insensitive uniqueness among
    /// live sessions. Only premium and enterprise sessions may be renamed.
    ///
    /// # Errors
    ///
    /// `TierForbidden` for free-tier sessions, `Validation` for a malformed
    /// name, `DuplicateName` on collision, `NotFound` for an unknown id.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        if !session.tier.allows_rename() {
            return Err(SiloError::tier_forbidden(session.tier.as_str(), "rename"));
        }

        let normalized = normalize_display_name(new_name)?;

        let key = name_comparison_key(&normalized);
        let duplicate = sessions.values().any(|other| {
            other.id != id
                && other.status != SessionStatus::PendingDeletion
                && other
                    .display_name
                    .as_deref()
                    .is_some_and(|name| name_comparison_key(name) == key)
        });
        if duplicate {
            return Err(SiloError::duplicate_name(normalized));
        }

        session.display_name = Some(normalized);
        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session.clone());

        tracing::debug!("renamed session {}", session.id);
        Ok(session)
    }

    /// Changes a session's display color.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed color, `NotFound` for an unknown id.
    pub async fn set_color(&self, id: &str, color: &str) -> Result<Session> {
        validate_display_color(color)?;

        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        session.display_color = color.to_string();
        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Returns a session by id.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Lists all sessions in creation order.
    pub async fn list_all(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    /// Marks a session active and bumps `last_seen_at`.
    ///
    /// Called when a live context attaches to the session.
    pub async fn mark_active(&self, id: &str) -> Result<Session> {
        self.update_status(id, SessionStatus::Active, true).await
    }

    /// Marks a session dormant.
    ///
    /// Called when a session's last live context detaches, and by the
    /// reconciliation engine for sessions it preserves.
    pub async fn mark_dormant(&self, id: &str) -> Result<Session> {
        self.update_status(id, SessionStatus::Dormant, false).await
    }

    /// Marks a session for deletion. The record stays in the durable store
    /// until the next compaction pass removes it.
    pub async fn mark_pending_deletion(&self, id: &str) -> Result<Session> {
        self.update_status(id, SessionStatus::PendingDeletion, false)
            .await
    }

    /// Deletes a session record immediately.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `StoreUnavailable` if the durable
    /// delete fails (the in-memory record is kept in that case).
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(id) {
            return Err(SiloError::not_found("session", id));
        }

        self.store
            .commit(vec![StoreOp::delete(session_key(id))])
            .await?;
        sessions.remove(id);

        tracing::info!("deleted session {}", id);
        Ok(())
    }

    /// Physically removes every session marked `PendingDeletion` in one
    /// all-or-nothing commit. Returns the number of sessions removed.
    pub async fn compact(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.status == SessionStatus::PendingDeletion)
            .map(|s| s.id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let batch = expired
            .iter()
            .map(|id| StoreOp::delete(session_key(id)))
            .collect();
        self.store.commit(batch).await?;

        for id in &expired {
            sessions.remove(id);
        }

        tracing::info!("compaction removed {} expired sessions", expired.len());
        Ok(expired.len())
    }

    /// Reads one credential value from a session's isolated store.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session id.
    pub async fn credential(&self, id: &str, origin: &str, key: &str) -> Result<Option<String>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| SiloError::not_found("session", id))?;

        Ok(session
            .credential_entries
            .get(origin)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    /// Writes one credential value into a session's isolated store and bumps
    /// `last_seen_at`.
    pub async fn set_credential(
        &self,
        id: &str,
        origin: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        session
            .credential_entries
            .entry(origin.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        session.last_seen_at = Utc::now();

        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Drops every credential entry of one session.
    pub async fn clear_credentials(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        session.credential_entries.clear();
        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Records the last-known navigation target of a formerly owned context.
    ///
    /// Only enterprise sessions persist targets; for other tiers this is a
    /// no-op because their context associations are not meaningful across a
    /// restart.
    pub async fn record_restore_target(&self, id: &str, target: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        if session.tier != Tier::Enterprise || target.is_empty() {
            return Ok(());
        }

        // Most recent target last; re-recording moves it to the end.
        session.restore_targets.retain(|t| t != target);
        session.restore_targets.push(target.to_string());

        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        touch_last_seen: bool,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let mut session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SiloError::not_found("session", id))?;

        if session.status == status && !touch_last_seen {
            return Ok(session);
        }

        session.status = status;
        if touch_last_seen {
            session.last_seen_at = Utc::now();
        }

        self.commit_session(&session).await?;
        sessions.insert(session.id.clone(), session.clone());

        tracing::debug!("session {} -> {:?}", session.id, status);
        Ok(session)
    }

    /// Commits a single session record to the durable store.
    async fn commit_session(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_value(session)?;
        self.store
            .commit(vec![StoreOp::put(session.store_key(), value)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::FakeStore;

    async fn registry_with_store() -> (Arc<FakeStore>, SessionRegistry) {
        let store = Arc::new(FakeStore::new());
        let registry = SessionRegistry::load(store.clone()).await.unwrap();
        (store, registry)
    }

    #[tokio::test]
    async fn test_create_persists_and_lists_in_creation_order() {
        let (_, registry) = registry_with_store().await;

        let first = registry.create(Tier::Free, "#112233").await.unwrap();
        let second = registry.create(Tier::Premium, "#445566").await.unwrap();

        let all = registry.list_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
        assert_eq!(all[0].status, SessionStatus::Dormant);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_color() {
        let (_, registry) = registry_with_store().await;
        let err = registry.create(Tier::Free, "red").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_rename_round_trip_survives_restart() {
        let store = Arc::new(FakeStore::new());
        let registry = SessionRegistry::load(store.clone()).await.unwrap();

        let session = registry.create(Tier::Premium, "#FF6B6B").await.unwrap();
        registry.rename(&session.id, "Work Gmail").await.unwrap();

        // Restart simulation: drop the in-memory view, reload from the store.
        let reloaded = SessionRegistry::load(store).await.unwrap();
        let restored = reloaded.get(&session.id).await.unwrap();
        assert_eq!(restored.display_name.as_deref(), Some("Work Gmail"));
        assert_eq!(restored.tier, Tier::Premium);
        assert_eq!(restored.status, SessionStatus::Dormant);
        assert_eq!(restored.display_color, "#FF6B6B");
    }

    #[tokio::test]
    async fn test_rename_rejects_markup() {
        let (_, registry) = registry_with_store().await;
        let session = registry.create(Tier::Premium, "#112233").await.unwrap();

        let err = registry.rename(&session.id, "<script>").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(registry.get(&session.id).await.unwrap().display_name, None);
    }

    #[tokio::test]
    async fn test_rename_rejects_case_insensitive_duplicate() {
        let (_, registry) = registry_with_store().await;
        let first = registry.create(Tier::Premium, "#112233").await.unwrap();
        let second = registry.create(Tier::Premium, "#445566").await.unwrap();

        registry.rename(&first.id, "Work Gmail").await.unwrap();
        let err = registry.rename(&second.id, "work gmail").await.unwrap_err();
        assert!(err.is_duplicate_name());
    }

    #[tokio::test]
    async fn test_rename_is_gated_by_tier() {
        let (_, registry) = registry_with_store().await;
        let session = registry.create(Tier::Free, "#112233").await.unwrap();

        let err = registry.rename(&session.id, "My Session").await.unwrap_err();
        assert!(err.is_tier_forbidden());
    }

    #[tokio::test]
    async fn test_renaming_over_a_pending_deletion_name_is_allowed() {
        let (_, registry) = registry_with_store().await;
        let first = registry.create(Tier::Premium, "#112233").await.unwrap();
        let second = registry.create(Tier::Premium, "#445566").await.unwrap();

        registry.rename(&first.id, "Work Gmail").await.unwrap();
        registry.mark_pending_deletion(&first.id).await.unwrap();

        assert!(registry.rename(&second.id, "Work Gmail").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_commit_does_not_advance_memory_state() {
        let (store, registry) = registry_with_store().await;
        let session = registry.create(Tier::Premium, "#112233").await.unwrap();

        store.set_fail_commits(true);
        let err = registry.rename(&session.id, "New Name").await.unwrap_err();
        assert!(err.is_store_unavailable());

        // The in-memory view still matches the last successful commit.
        assert_eq!(registry.get(&session.id).await.unwrap().display_name, None);
    }

    #[tokio::test]
    async fn test_compact_removes_only_pending_deletion() {
        let (store, registry) = registry_with_store().await;
        let keep = registry.create(Tier::Premium, "#112233").await.unwrap();
        let drop = registry.create(Tier::Free, "#445566").await.unwrap();

        registry.mark_pending_deletion(&drop.id).await.unwrap();
        assert_eq!(registry.compact().await.unwrap(), 1);

        assert!(registry.get(&keep.id).await.is_some());
        assert!(registry.get(&drop.id).await.is_none());
        assert!(store.get(&session_key(&drop.id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credentials_are_scoped_per_session_and_origin() {
        let (_, registry) = registry_with_store().await;
        let a = registry.create(Tier::Premium, "#112233").await.unwrap();
        let b = registry.create(Tier::Premium, "#445566").await.unwrap();

        registry
            .set_credential(&a.id, "https://example.com", "sid", "alpha")
            .await
            .unwrap();

        assert_eq!(
            registry
                .credential(&a.id, "https://example.com", "sid")
                .await
                .unwrap()
                .as_deref(),
            Some("alpha")
        );
        // No cross-session leakage.
        assert_eq!(
            registry
                .credential(&b.id, "https://example.com", "sid")
                .await
                .unwrap(),
            None
        );
        // Origin-scoped within the session.
        assert_eq!(
            registry
                .credential(&a.id, "https://other.com", "sid")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_set_credential_bumps_last_seen() {
        let (_, registry) = registry_with_store().await;
        let session = registry.create(Tier::Free, "#112233").await.unwrap();
        let before = registry.get(&session.id).await.unwrap().last_seen_at;

        registry
            .set_credential(&session.id, "https://example.com", "sid", "v")
            .await
            .unwrap();

        let after = registry.get(&session.id).await.unwrap().last_seen_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_restore_targets_recorded_for_enterprise_only() {
        let (_, registry) = registry_with_store().await;
        let ent = registry.create(Tier::Enterprise, "#112233").await.unwrap();
        let free = registry.create(Tier::Free, "#445566").await.unwrap();

        registry
            .record_restore_target(&ent.id, "https://example.com/inbox")
            .await
            .unwrap();
        registry
            .record_restore_target(&free.id, "https://example.com/inbox")
            .await
            .unwrap();

        assert_eq!(
            registry.get(&ent.id).await.unwrap().restore_targets,
            vec!["https://example.com/inbox"]
        );
        assert!(registry.get(&free.id).await.unwrap().restore_targets.is_empty());
    }

    #[tokio::test]
    async fn test_clear_credentials() {
        let (_, registry) = registry_with_store().await;
        let session = registry.create(Tier::Premium, "#112233").await.unwrap();

        registry
            .set_credential(&session.id, "https://example.com", "sid", "v")
            .await
            .unwrap();
        registry.clear_credentials(&session.id).await.unwrap();

        assert_eq!(
            registry
                .credential(&session.id, "https://example.com", "sid")
                .await
                .unwrap(),
            None
        );
    }
}
