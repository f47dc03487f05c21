use async_trait::async_trait;
use silo_application::{SessionFilter, SessionService};
use silo_core::error::{Result, SiloError};
use silo_core::host::{HostEnvironment, LiveContext};
use silo_core::session::{SessionStatus, Tier};
use silo_core::store::DurableStore;
use silo_infrastructure::{MemoryStore, SiloConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted host double: pops one listing per query (repeating the last),
/// hands out sequential context ids for `open_context`.
struct ScriptedHost {
    listings: Mutex<VecDeque<Result<Vec<LiveContext>>>>,
    opened: Mutex<u32>,
}

impl ScriptedHost {
    fn new(listings: Vec<Result<Vec<LiveContext>>>) -> Self {
        Self {
            listings: Mutex::new(listings.into()),
            opened: Mutex::new(0),
        }
    }

    fn quiet() -> Self {
        Self::new(vec![Ok(Vec::new())])
    }
}

#[async_trait]
impl HostEnvironment for ScriptedHost {
    async fn list_live_contexts(&self) -> Result<Vec<LiveContext>> {
        let mut listings = self.listings.lock().unwrap();
        if listings.len() > 1 {
            listings.pop_front().unwrap()
        } else {
            listings.front().cloned().unwrap_or(Ok(Vec::new()))
        }
    }

    async fn open_context(&self, _navigation_target: &str) -> Result<String> {
        let mut opened = self.opened.lock().unwrap();
        *opened += 1;
        Ok(format!("opened-ctx-{}", *opened))
    }
}

fn fast_config() -> SiloConfig {
    let mut config = SiloConfig::default();
    config.reconcile.initial_delay_ms = 0;
    config.reconcile.retry_delay_ms = 0;
    config
}

async fn service_over(store: Arc<MemoryStore>, host: Arc<ScriptedHost>) -> SessionService {
    SessionService::new(store, host, fast_config())
        .await
        .expect("service should load from an empty store")
}

#[tokio::test]
async fn test_active_iff_owning_live_contexts() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;

    let session = service
        .create_session(Tier::Premium, "#112233")
        .await
        .unwrap();
    assert_eq!(service.live_context_count(&session.id).await, 0);
    assert_eq!(
        service.list_sessions(SessionFilter::Visible).await[0].status,
        SessionStatus::Dormant
    );

    service
        .handle_context_opened("ctx-1", &session.id, Some("https://example.com"))
        .await
        .unwrap();
    assert_eq!(service.live_context_count(&session.id).await, 1);
    assert_eq!(
        service.list_sessions(SessionFilter::Visible).await[0].status,
        SessionStatus::Active
    );

    service.handle_context_closed("ctx-1").await.unwrap();
    assert_eq!(service.live_context_count(&session.id).await, 0);
    assert_eq!(
        service.list_sessions(SessionFilter::Visible).await[0].status,
        SessionStatus::Dormant
    );
}

#[tokio::test]
async fn test_attach_is_idempotent_through_the_service() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;

    let session = service
        .create_session(Tier::Premium, "#112233")
        .await
        .unwrap();

    service
        .handle_context_opened("ctx-1", &session.id, None)
        .await
        .unwrap();
    service
        .handle_context_opened("ctx-1", &session.id, None)
        .await
        .unwrap();

    assert_eq!(service.live_context_count(&session.id).await, 1);
}

#[tokio::test]
async fn test_create_rename_restart_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let session_id = {
        let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;
        let session = service
            .create_session(Tier::Premium, "#FF6B6B")
            .await
            .unwrap();
        service
            .rename_session(&session.id, "Work Gmail")
            .await
            .unwrap();
        session.id
    };

    // Restart simulation: a fresh service over the same durable tier.
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;
    let sessions = service.list_sessions(SessionFilter::Visible).await;

    assert_eq!(sessions.len(), 1);
    let restored = &sessions[0];
    assert_eq!(restored.id, session_id);
    assert_eq!(restored.display_name.as_deref(), Some("Work Gmail"));
    assert_eq!(restored.tier, Tier::Premium);
    assert_eq!(restored.status, SessionStatus::Dormant);
}

#[tokio::test]
async fn test_enterprise_auto_restore_across_restart() {
    let store = Arc::new(MemoryStore::new());

    // First process lifetime: the session owns a context on the inbox.
    let session_id = {
        let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;
        let session = service
            .create_session(Tier::Enterprise, "#112233")
            .await
            .unwrap();
        service
            .handle_context_opened("ctx-1", &session.id, Some("https://example.com/inbox"))
            .await
            .unwrap();
        service.handle_context_closed("ctx-1").await.unwrap();
        session.id
    };

    // Second process lifetime: the host restored a context with a fresh id
    // but the same navigation target.
    let host = Arc::new(ScriptedHost::new(vec![Ok(vec![LiveContext {
        context_id: "restored-ctx-42".to_string(),
        navigation_target: "https://example.com/inbox".to_string(),
    }])]));
    let service = service_over(store, host).await;

    let report = service.handle_process_start().await.unwrap();
    assert_eq!(report.auto_restored, vec![session_id.clone()]);

    assert_eq!(
        service.resolve_session_for_context("restored-ctx-42").await,
        Some(session_id.clone())
    );
    assert_eq!(
        service.list_sessions(SessionFilter::Visible).await[0].status,
        SessionStatus::Active
    );
}

#[tokio::test]
async fn test_host_errors_leave_sessions_dormant() {
    let store = Arc::new(MemoryStore::new());
    let session_id = {
        let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;
        service
            .create_session(Tier::Premium, "#112233")
            .await
            .unwrap()
            .id
    };

    let host = Arc::new(ScriptedHost::new(vec![Err(SiloError::host_query(
        "host restore still in progress",
    ))]));
    let service = service_over(store, host).await;

    let report = service.handle_process_start().await.unwrap();
    assert_eq!(report.attempts_used, 3);
    assert!(report.expired.is_empty());

    let session = &service.list_sessions(SessionFilter::All).await[0];
    assert_eq!(session.id, session_id);
    assert_eq!(session.status, SessionStatus::Dormant);
}

#[tokio::test]
async fn test_reconciliation_compacts_expired_sessions() {
    let store = Arc::new(MemoryStore::new());

    // Seed a free session idle beyond the retention window by rewriting its
    // record the way a long-dead process would have left it.
    let session_id = {
        let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;
        let session = service
            .create_session(Tier::Free, "#112233")
            .await
            .unwrap();
        session.id
    };
    let key = silo_core::session::session_key(&session_id);
    let mut record: silo_core::session::Session =
        serde_json::from_value(store.get(&key).await.unwrap().unwrap()).unwrap();
    record.last_seen_at = chrono::Utc::now() - chrono::Duration::days(30);
    store
        .commit(vec![silo_core::store::StoreOp::put(
            key.clone(),
            serde_json::to_value(&record).unwrap(),
        )])
        .await
        .unwrap();

    let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;
    let report = service.handle_process_start().await.unwrap();

    assert_eq!(report.expired, vec![session_id]);
    // The tombstone was compacted away: the record is physically gone.
    assert_eq!(store.get(&key).await.unwrap(), None);
    assert!(service.list_sessions(SessionFilter::All).await.is_empty());
}

#[tokio::test]
async fn test_reopen_dormant() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;

    let session = service
        .create_session(Tier::Enterprise, "#112233")
        .await
        .unwrap();
    service
        .handle_context_opened("ctx-1", &session.id, Some("https://example.com/inbox"))
        .await
        .unwrap();
    service.handle_context_closed("ctx-1").await.unwrap();

    let context_id = service.reopen_dormant(&session.id).await.unwrap();
    assert_eq!(
        service.resolve_session_for_context(&context_id).await,
        Some(session.id.clone())
    );
    assert_eq!(
        service.list_sessions(SessionFilter::Visible).await[0].status,
        SessionStatus::Active
    );

    let err = service.reopen_dormant(&session.id).await.unwrap_err();
    assert!(matches!(err, SiloError::AlreadyActive(_)));

    let err = service.reopen_dormant("no-such-session").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_credentials_are_isolated_between_sessions() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;

    let work = service
        .create_session(Tier::Premium, "#112233")
        .await
        .unwrap();
    let personal = service
        .create_session(Tier::Premium, "#445566")
        .await
        .unwrap();

    service
        .set_credential(&work.id, "https://mail.example.com", "sid", "work-token")
        .await
        .unwrap();

    assert_eq!(
        service
            .get_credential(&work.id, "https://mail.example.com", "sid")
            .await
            .unwrap()
            .as_deref(),
        Some("work-token")
    );
    assert_eq!(
        service
            .get_credential(&personal.id, "https://mail.example.com", "sid")
            .await
            .unwrap(),
        None
    );

    service.clear_credentials(&work.id).await.unwrap();
    assert_eq!(
        service
            .get_credential(&work.id, "https://mail.example.com", "sid")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_store_outage_fails_the_operation_but_keeps_state() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store.clone(), Arc::new(ScriptedHost::quiet())).await;

    let session = service
        .create_session(Tier::Premium, "#112233")
        .await
        .unwrap();

    store.set_fail_commits(true);
    let err = service
        .set_credential(&session.id, "https://example.com", "sid", "v")
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());

    store.set_fail_commits(false);
    // The failed write never became visible.
    assert_eq!(
        service
            .get_credential(&session.id, "https://example.com", "sid")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_context_stealing_updates_both_sessions() {
    let store = Arc::new(MemoryStore::new());
    let service = service_over(store, Arc::new(ScriptedHost::quiet())).await;

    let a = service
        .create_session(Tier::Premium, "#112233")
        .await
        .unwrap();
    let b = service
        .create_session(Tier::Premium, "#445566")
        .await
        .unwrap();

    service
        .handle_context_opened("ctx-1", &a.id, None)
        .await
        .unwrap();
    service
        .handle_context_opened("ctx-1", &b.id, None)
        .await
        .unwrap();

    assert_eq!(
        service.resolve_session_for_context("ctx-1").await,
        Some(b.id.clone())
    );
    let sessions = service.list_sessions(SessionFilter::Visible).await;
    let a_status = sessions.iter().find(|s| s.id == a.id).unwrap().status;
    let b_status = sessions.iter().find(|s| s.id == b.id).unwrap().status;
    assert_eq!(a_status, SessionStatus::Dormant);
    assert_eq!(b_status, SessionStatus::Active);
}
