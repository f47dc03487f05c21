//! Tiered retention policy engine.
//!
//! Pure decision logic: given a session's tier, its live-context count, and
//! the clock, decide what happens to it at reconciliation time. The engine
//! never deletes on an instantaneous zero-context reading, because zero is
//! indistinguishable from "the host has not finished restoring contexts
//! yet"; callers only apply `Expire` after the reconciliation retry budget
//! is spent.

use crate::session::{Session, Tier};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How an enterprise session locates contexts to re-attach after restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Match live contexts by their navigation target against the session's
    /// persisted restore targets.
    NavigationTarget,
}

/// Outcome of a retention decision for a session with zero live contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionDecision {
    /// Attempt automatic context re-attachment; fall back to dormant if no
    /// context matches within the reconciliation window.
    AutoRestore { strategy: MatchStrategy },
    /// Keep the session dormant for later manual reactivation.
    PreserveDormant,
    /// Mark the session for removal on the next compaction pass.
    Expire { reason: &'static str },
}

/// Tunable retention windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Free-tier idle window in days; a free session with zero contexts
    /// expires once idle longer than this.
    #[serde(default = "default_free_idle_days")]
    pub free_idle_days: i64,
}

fn default_free_idle_days() -> i64 {
    7
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            free_idle_days: default_free_idle_days(),
        }
    }
}

impl RetentionConfig {
    /// The free-tier idle window as a duration.
    pub fn free_idle_window(&self) -> Duration {
        Duration::days(self.free_idle_days)
    }
}

/// Decides the fate of one session at reconciliation time.
///
/// Returns `None` when the session owns at least one live context: it is
/// active regardless of tier and no retention decision applies.
pub fn decide(
    session: &Session,
    live_context_count: usize,
    now: DateTime<Utc>,
    config: &RetentionConfig,
) -> Option<RetentionDecision> {
    if live_context_count > 0 {
        return None;
    }

    let decision = match session.tier {
        Tier::Enterprise => RetentionDecision::AutoRestore {
            strategy: MatchStrategy::NavigationTarget,
        },
        Tier::Premium => RetentionDecision::PreserveDormant,
        Tier::Free => {
            if now - session.last_seen_at > config.free_idle_window() {
                RetentionDecision::Expire {
                    reason: "idle-timeout",
                }
            } else {
                RetentionDecision::PreserveDormant
            }
        }
    };
    Some(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn session_idle_for(tier: Tier, idle: Duration, now: DateTime<Utc>) -> Session {
        let mut session = Session::new(tier, "#112233".to_string(), now - idle);
        session.last_seen_at = now - idle;
        session
    }

    #[test]
    fn test_live_contexts_need_no_decision() {
        let now = Utc::now();
        let session = session_idle_for(Tier::Free, Duration::days(30), now);
        assert_eq!(decide(&session, 1, now, &RetentionConfig::default()), None);
    }

    #[test]
    fn test_free_session_expires_after_idle_window() {
        let now = Utc::now();
        let config = RetentionConfig::default();

        let idle_8_days = session_idle_for(Tier::Free, Duration::days(8), now);
        assert_eq!(
            decide(&idle_8_days, 0, now, &config),
            Some(RetentionDecision::Expire {
                reason: "idle-timeout"
            })
        );

        let idle_6_days = session_idle_for(Tier::Free, Duration::days(6), now);
        assert_eq!(
            decide(&idle_6_days, 0, now, &config),
            Some(RetentionDecision::PreserveDormant)
        );
    }

    #[test]
    fn test_premium_is_preserved_indefinitely() {
        let now = Utc::now();
        let session = session_idle_for(Tier::Premium, Duration::days(365), now);
        assert_eq!(
            decide(&session, 0, now, &RetentionConfig::default()),
            Some(RetentionDecision::PreserveDormant)
        );
    }

    #[test]
    fn test_enterprise_attempts_auto_restore() {
        let now = Utc::now();
        let session = session_idle_for(Tier::Enterprise, Duration::days(365), now);
        assert_eq!(
            decide(&session, 0, now, &RetentionConfig::default()),
            Some(RetentionDecision::AutoRestore {
                strategy: MatchStrategy::NavigationTarget
            })
        );
    }

    #[test]
    fn test_idle_window_is_configurable() {
        let now = Utc::now();
        let config = RetentionConfig { free_idle_days: 1 };
        let session = session_idle_for(Tier::Free, Duration::days(2), now);
        assert_eq!(
            decide(&session, 0, now, &config),
            Some(RetentionDecision::Expire {
                reason: "idle-timeout"
            })
        );
    }
}
