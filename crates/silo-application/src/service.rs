//! Session service facade.
//!
//! `SessionService` coordinates the session registry, the ephemeral context
//! ownership map, and the cold-start reconciliation engine behind the
//! interface external collaborators consume. Collaborators never mutate the
//! registry or the ownership map directly.

use silo_core::context::ContextOwnershipMap;
use silo_core::error::{Result, SiloError};
use silo_core::host::HostEnvironment;
use silo_core::reconcile::{ReconcileReport, Reconciler};
use silo_core::session::{Session, SessionRegistry, SessionStatus, Tier};
use silo_core::store::{DurableStore, TieredStore};
use silo_infrastructure::SiloConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Filter for session listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionFilter {
    /// Everything except sessions already marked for deletion. This is what
    /// the UI renders.
    #[default]
    Visible,
    /// Every session, tombstoned ones included.
    All,
    /// Sessions in one specific status.
    ByStatus(SessionStatus),
}

/// Facade over the session subsystem.
///
/// # Responsibilities
///
/// - Creating, renaming, recoloring, reopening, and listing sessions
/// - Routing host context events into ownership and status transitions
/// - Running cold-start reconciliation on process start
/// - The read-only queries the credential-injection collaborator uses
///
/// Operations are serialized by the host's own dispatch; the interior locks
/// only guard against the host suspending the worker between awaits.
pub struct SessionService {
    /// Session records; every mutation commits durably before returning.
    registry: Arc<SessionRegistry>,
    /// Ephemeral context-to-session ownership, rebuilt on process start.
    ownership: RwLock<ContextOwnershipMap>,
    /// The surrounding host application.
    host: Arc<dyn HostEnvironment>,
    /// Two-tier store handle, shared with the reconciler for the
    /// generation token.
    store: Arc<TieredStore>,
    config: SiloConfig,
    /// Signalled when the host announces process shutdown.
    shutdown: CancellationToken,
}

impl SessionService {
    /// Creates the service over a durable store and host binding, loading
    /// the registry from the durable tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable tier cannot be read.
    pub async fn new(
        durable: Arc<dyn DurableStore>,
        host: Arc<dyn HostEnvironment>,
        config: SiloConfig,
    ) -> Result<Self> {
        let store = Arc::new(TieredStore::new(durable));
        let registry = Arc::new(SessionRegistry::load(store.clone()).await?);

        Ok(Self {
            registry,
            ownership: RwLock::new(ContextOwnershipMap::new()),
            host,
            store,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Signals shutdown: a reconciliation pass in flight abandons its
    /// remaining retry attempts without committing partial results.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Handles the host's process-start event: runs one reconciliation pass
    /// and, when it completes normally, compacts tombstoned sessions.
    ///
    /// # Errors
    ///
    /// Returns an error only if the generation token cannot be read or
    /// bumped; every per-session failure is contained in the report.
    pub async fn handle_process_start(&self) -> Result<ReconcileReport> {
        let reconciler = Reconciler::new(
            self.registry.clone(),
            self.host.clone(),
            self.store.clone(),
            self.config.reconcile.clone(),
            self.config.retention.clone(),
        );

        let mut ownership = self.ownership.write().await;
        let report = reconciler.run(&mut ownership, &self.shutdown).await?;

        if !report.cancelled && !report.superseded {
            if let Err(err) = self.registry.compact().await {
                // Tombstones stay behind for the next pass; nothing is lost.
                tracing::warn!("compaction failed: {}", err);
            }
        }
        Ok(report)
    }

    /// Resolves the owning session of a live context, if any.
    ///
    /// The credential-injection collaborator calls this before deciding
    /// which credential overlay applies to an exchange for that context.
    pub async fn resolve_session_for_context(&self, context_id: &str) -> Option<String> {
        self.ownership
            .read()
            .await
            .owner_of(context_id)
            .map(str::to_string)
    }

    /// Number of live contexts currently owned by a session.
    pub async fn live_context_count(&self, session_id: &str) -> usize {
        self.ownership
            .read()
            .await
            .live_context_count_for(session_id)
    }

    /// Lists sessions in creation order, filtered for the caller.
    pub async fn list_sessions(&self, filter: SessionFilter) -> Vec<Session> {
        self.registry
            .list_all()
            .await
            .into_iter()
            .filter(|session| match filter {
                SessionFilter::All => true,
                SessionFilter::Visible => session.status != SessionStatus::PendingDeletion,
                SessionFilter::ByStatus(status) => session.status == status,
            })
            .collect()
    }

    /// Creates a new session with the caller's current licensing tier.
    pub async fn create_session(&self, tier: Tier, display_color: &str) -> Result<Session> {
        self.registry.create(tier, display_color).await
    }

    /// Renames a session, subject to tier and validation rules.
    pub async fn rename_session(&self, session_id: &str, new_name: &str) -> Result<Session> {
        self.registry.rename(session_id, new_name).await
    }

    /// Changes a session's display color.
    pub async fn set_color(&self, session_id: &str, color: &str) -> Result<Session> {
        self.registry.set_color(session_id, color).await
    }

    /// Reopens a dormant session: asks the host for a new context at the
    /// session's most recent restore target and attaches it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or tombstoned session, `AlreadyActive` if
    /// the session already owns a live context, `HostQuery` if the host
    /// cannot open a context.
    pub async fn reopen_dormant(&self, session_id: &str) -> Result<String> {
        let session = self
            .registry
            .get(session_id)
            .await
            .filter(|s| s.status != SessionStatus::PendingDeletion)
            .ok_or_else(|| SiloError::not_found("session", session_id))?;

        if session.status == SessionStatus::Active {
            return Err(SiloError::AlreadyActive(session_id.to_string()));
        }

        let target = session
            .restore_targets
            .last()
            .cloned()
            .unwrap_or_default();
        let context_id = self.host.open_context(&target).await?;

        self.registry.mark_active(session_id).await?;
        self.ownership.write().await.attach(
            &context_id,
            session_id,
            (!target.is_empty()).then_some(target.as_str()),
        );

        tracing::info!(
            "reopened session {} in context {}",
            session_id,
            context_id
        );
        Ok(context_id)
    }

    /// Attaches a newly opened host context to a session and marks the
    /// session active.
    ///
    /// Attaching the same pair again is a no-op; attaching a context owned
    /// by a different session steals it from the old owner, which falls
    /// back to dormant if that was its last context.
    pub async fn handle_context_opened(
        &self,
        context_id: &str,
        session_id: &str,
        navigation_target: Option<&str>,
    ) -> Result<()> {
        if self.registry.get(session_id).await.is_none() {
            return Err(SiloError::not_found("session", session_id));
        }

        self.registry.mark_active(session_id).await?;

        let stolen = {
            let mut ownership = self.ownership.write().await;
            let stolen = ownership.attach(context_id, session_id, navigation_target);
            stolen.filter(|prev| ownership.live_context_count_for(prev) == 0)
        };
        if let Some(prev) = stolen {
            if let Err(err) = self.registry.mark_dormant(&prev).await {
                tracing::warn!("could not mark stolen-from session {} dormant: {}", prev, err);
            }
        }
        Ok(())
    }

    /// Handles the host's context-closed event.
    ///
    /// Unknown contexts are ignored. For enterprise sessions the context's
    /// last navigation target is persisted for AutoRestore matching; a
    /// session losing its last context falls back to dormant.
    pub async fn handle_context_closed(&self, context_id: &str) -> Result<()> {
        let detached = self.ownership.write().await.detach(context_id);
        let Some((owner, target)) = detached else {
            return Ok(());
        };

        if let Some(target) = target {
            if let Err(err) = self.registry.record_restore_target(&owner, &target).await {
                tracing::warn!("could not record restore target for {}: {}", owner, err);
            }
        }

        if self.live_context_count(&owner).await == 0 {
            self.registry.mark_dormant(&owner).await?;
        }
        Ok(())
    }

    /// Reads one credential value from a session's isolated store.
    pub async fn get_credential(
        &self,
        session_id: &str,
        origin: &str,
        key: &str,
    ) -> Result<Option<String>> {
        self.registry.credential(session_id, origin, key).await
    }

    /// Writes one credential value into a session's isolated store.
    pub async fn set_credential(
        &self,
        session_id: &str,
        origin: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.registry
            .set_credential(session_id, origin, key, value)
            .await
    }

    /// Drops every credential entry of one session.
    pub async fn clear_credentials(&self, session_id: &str) -> Result<()> {
        self.registry.clear_credentials(session_id).await
    }
}
