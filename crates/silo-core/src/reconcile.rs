//! Cold-start reconciliation engine.
//!
//! On process start the host restores its own execution contexts
//! asynchronously, so an early context query that returns nothing is
//! indistinguishable from "there truly are no contexts". The engine waits an
//! initial delay, polls the host with a bounded retry budget, rebuilds the
//! ephemeral ownership map from whatever contexts exist, and applies the
//! retention policy per session with independent commits.
//!
//! A monotonically increasing generation token, bumped on each process
//! start, guards against a stale still-in-flight run from a previous
//! (crashed) start committing results after a newer one has begun.

use crate::context::ContextOwnershipMap;
use crate::error::Result;
use crate::host::{HostEnvironment, LiveContext};
use crate::retention::{RetentionConfig, RetentionDecision, decide};
use crate::session::{SessionRegistry, SessionStatus, Tier};
use crate::store::{DurableStore, StoreOp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Durable-store key of the reconciliation generation counter.
pub const GENERATION_KEY: &str = "meta/generation";

/// Tunable reconciliation timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delay before the first context query; the host needs time to begin
    /// restoring its own contexts before any query is meaningful.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay between query attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Query attempts before an empty result is treated as authoritative.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconcileConfig {
    fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Named states of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Wait,
    QueryContexts,
    Correlate,
    ApplyPolicy,
    Done,
}

/// Outcome summary of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Generation token this pass committed under.
    pub generation: u64,
    /// Host query attempts actually issued.
    pub attempts_used: u32,
    /// Live contexts the final query reported.
    pub contexts_seen: usize,
    /// Enterprise sessions re-attached by navigation-target matching.
    pub auto_restored: Vec<String>,
    /// Sessions preserved as dormant.
    pub preserved_dormant: Vec<String>,
    /// Sessions marked pending deletion.
    pub expired: Vec<String>,
    /// Sessions whose status commit failed and was skipped.
    pub failed_commits: Vec<String>,
    /// The pass was abandoned on host shutdown.
    pub cancelled: bool,
    /// A newer process start bumped the generation token; remaining commits
    /// were discarded.
    pub superseded: bool,
}

/// Orchestrates cold-start recovery: poll, correlate, apply policy, commit.
pub struct Reconciler {
    registry: Arc<SessionRegistry>,
    host: Arc<dyn HostEnvironment>,
    store: Arc<dyn DurableStore>,
    config: ReconcileConfig,
    retention: RetentionConfig,
}

impl Reconciler {
    /// Creates a reconciler over the given collaborators.
    pub fn new(
        registry: Arc<SessionRegistry>,
        host: Arc<dyn HostEnvironment>,
        store: Arc<dyn DurableStore>,
        config: ReconcileConfig,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            registry,
            host,
            store,
            config,
            retention,
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// The ownership map is rebuilt from scratch; per-session status commits
    /// are independent, so one failed commit is logged and skipped without
    /// blocking the others. Cancellation is honored at every suspension
    /// point: a cancelled pass leaves state exactly as of the last completed
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` only if the generation token itself cannot
    /// be read or bumped; in that case nothing has been touched and every
    /// session keeps its persisted status.
    pub async fn run(
        &self,
        ownership: &mut ContextOwnershipMap,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        report.generation = self.bump_generation().await?;
        tracing::info!("reconciliation started (generation {})", report.generation);

        let mut contexts: Vec<LiveContext> = Vec::new();
        let mut phase = Phase::Wait;

        while phase != Phase::Done {
            phase = match phase {
                Phase::Wait => {
                    let delay = if report.attempts_used == 0 {
                        self.config.initial_delay()
                    } else {
                        self.config.retry_delay()
                    };
                    if self.wait(delay, cancel).await {
                        report.cancelled = true;
                        Phase::Done
                    } else {
                        Phase::QueryContexts
                    }
                }
                Phase::QueryContexts => {
                    report.attempts_used += 1;
                    match self.host.list_live_contexts().await {
                        Ok(live) if !live.is_empty() => {
                            contexts = live;
                            Phase::Correlate
                        }
                        Ok(_) => {
                            tracing::debug!(
                                "context query {} of {} returned nothing",
                                report.attempts_used,
                                self.config.max_attempts
                            );
                            self.next_attempt_phase(report.attempts_used)
                        }
                        Err(err) => {
                            // A host error is retried identically to an empty
                            // result and never surfaced to the user.
                            tracing::warn!(
                                "context query {} of {} failed: {}",
                                report.attempts_used,
                                self.config.max_attempts,
                                err
                            );
                            self.next_attempt_phase(report.attempts_used)
                        }
                    }
                }
                Phase::Correlate => {
                    report.contexts_seen = contexts.len();
                    self.correlate(ownership, &contexts, cancel, &mut report)
                        .await;
                    if report.cancelled || report.superseded {
                        Phase::Done
                    } else {
                        Phase::ApplyPolicy
                    }
                }
                Phase::ApplyPolicy => {
                    self.apply_policy(ownership, cancel, &mut report).await;
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };
        }

        tracing::info!(
            "reconciliation finished: {} contexts, {} restored, {} dormant, {} expired",
            report.contexts_seen,
            report.auto_restored.len(),
            report.preserved_dormant.len(),
            report.expired.len()
        );
        Ok(report)
    }

    /// An empty or failed query retries until the budget is spent; only then
    /// is "zero contexts" treated as authoritative.
    fn next_attempt_phase(&self, attempts_used: u32) -> Phase {
        if attempts_used < self.config.max_attempts {
            Phase::Wait
        } else {
            Phase::Correlate
        }
    }

    /// Sleeps for `delay`, returning `true` if cancelled instead.
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    /// Reads, increments, and durably commits the generation token.
    async fn bump_generation(&self) -> Result<u64> {
        let current = self
            .store
            .get(GENERATION_KEY)
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let next = current + 1;
        self.store
            .commit(vec![StoreOp::put(GENERATION_KEY, json!(next))])
            .await?;
        Ok(next)
    }

    /// Whether this run still owns the generation token.
    async fn generation_is_current(&self, generation: u64) -> bool {
        match self.store.get(GENERATION_KEY).await {
            Ok(value) => value.and_then(|v| v.as_u64()) == Some(generation),
            // An unreadable token is treated as lost ownership; committing
            // blind would defeat the guard.
            Err(_) => false,
        }
    }

    /// Rebuilds the ownership map from the live contexts.
    ///
    /// Persisted context associations are only meaningful for enterprise
    /// sessions, via navigation-target matching; for every other tier the
    /// host reassigned context ids during restart, so ownership starts
    /// empty.
    async fn correlate(
        &self,
        ownership: &mut ContextOwnershipMap,
        contexts: &[LiveContext],
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        ownership.clear();

        let candidates: Vec<_> = self
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|s| s.tier == Tier::Enterprise && s.status != SessionStatus::PendingDeletion)
            .collect();
        if candidates.is_empty() {
            return;
        }

        let mut restored: HashSet<String> = HashSet::new();
        for context in contexts {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }

            let Some(session) = candidates
                .iter()
                .find(|s| s.restore_targets.iter().any(|t| t == &context.navigation_target))
            else {
                continue;
            };

            if !self.generation_is_current(report.generation).await {
                tracing::info!(
                    "generation {} superseded, discarding remaining correlation",
                    report.generation
                );
                report.superseded = true;
                return;
            }

            match self.registry.mark_active(&session.id).await {
                Ok(_) => {
                    ownership.attach(
                        &context.context_id,
                        &session.id,
                        Some(&context.navigation_target),
                    );
                    if restored.insert(session.id.clone()) {
                        report.auto_restored.push(session.id.clone());
                    }
                    tracing::info!(
                        "re-attached context {} to session {} by navigation target",
                        context.context_id,
                        session.id
                    );
                }
                Err(err) => {
                    tracing::warn!("could not restore session {}: {}", session.id, err);
                    report.failed_commits.push(session.id.clone());
                }
            }
        }
    }

    /// Applies the retention decision to every session, committing each
    /// transition independently.
    async fn apply_policy(
        &self,
        ownership: &ContextOwnershipMap,
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        let now = Utc::now();

        for session in self.registry.list_all().await {
            if session.status == SessionStatus::PendingDeletion {
                continue;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            if !self.generation_is_current(report.generation).await {
                tracing::info!(
                    "generation {} superseded, discarding remaining policy commits",
                    report.generation
                );
                report.superseded = true;
                return;
            }

            let live = ownership.live_context_count_for(&session.id);
            let outcome = match decide(&session, live, now, &self.retention) {
                None => {
                    // Live contexts keep the session active regardless of tier.
                    if session.status != SessionStatus::Active {
                        self.registry.mark_active(&session.id).await.map(|_| ())
                    } else {
                        Ok(())
                    }
                }
                // AutoRestore found no matching context during correlation;
                // fall back to preserving the session dormant.
                Some(RetentionDecision::AutoRestore { .. })
                | Some(RetentionDecision::PreserveDormant) => {
                    report.preserved_dormant.push(session.id.clone());
                    self.registry.mark_dormant(&session.id).await.map(|_| ())
                }
                Some(RetentionDecision::Expire { reason }) => {
                    tracing::info!("session {} expired ({})", session.id, reason);
                    report.expired.push(session.id.clone());
                    self.registry
                        .mark_pending_deletion(&session.id)
                        .await
                        .map(|_| ())
                }
            };

            if let Err(err) = outcome {
                // One session's commit failure must not block the others.
                tracing::warn!("status commit for session {} failed: {}", session.id, err);
                report.failed_commits.push(session.id.clone());
            }
        }
    }
}
