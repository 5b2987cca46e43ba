//! Stale ringing request policies
//!
//! Nothing in the signaling flow ever times a ringing request out, and the
//! broadcaster only ever sees the newest one. What happens to the others is
//! decided here. Policies are pure: they pick which requests to
//! auto-resolve, and the service applies those picks through the same
//! conditional update every other transition uses.

use chrono::{DateTime, Duration, Utc};
use ringline_core::{
    config::{SignalingConfig, StalePolicyKind},
    models::{CallRequest, CallTransition},
};
use std::sync::Arc;
use uuid::Uuid;

/// One automatic transition chosen by a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoResolution {
    pub id: Uuid,
    pub transition: CallTransition,
}

pub trait StaleRequestPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called after `arrived` is stored. `others` are the broadcaster's other
    /// ringing requests.
    fn on_arrival(&self, _arrived: &CallRequest, _others: &[CallRequest]) -> Vec<AutoResolution> {
        Vec::new()
    }

    /// Only ringing requests created before this instant are sweep candidates.
    /// `None` disables sweeping.
    fn sweep_cutoff(&self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }

    /// Pick which of the `candidates` to auto-resolve
    fn sweep(&self, _candidates: &[CallRequest], _now: DateTime<Utc>) -> Vec<AutoResolution> {
        Vec::new()
    }
}

/// Leave every ringing request alone until a person acts on it
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyPolicy;

impl StaleRequestPolicy for LegacyPolicy {
    fn name(&self) -> &'static str {
        "legacy"
    }
}

/// Auto-reject requests that have been ringing longer than `ttl`
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    ttl: Duration,
}

impl TtlPolicy {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }
}

impl StaleRequestPolicy for TtlPolicy {
    fn name(&self) -> &'static str {
        "ttl"
    }

    fn sweep_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.ttl)
    }

    fn sweep(&self, candidates: &[CallRequest], now: DateTime<Utc>) -> Vec<AutoResolution> {
        candidates
            .iter()
            .filter(|c| c.is_ringing() && c.ringing_for(now) > self.ttl)
            .map(|c| AutoResolution {
                id: c.id,
                transition: CallTransition::Expire,
            })
            .collect()
    }
}

/// Auto-reject older ringing requests as soon as a newer one arrives for
/// the same broadcaster
#[derive(Debug, Default, Clone, Copy)]
pub struct SupersedePolicy;

impl StaleRequestPolicy for SupersedePolicy {
    fn name(&self) -> &'static str {
        "supersede"
    }

    fn on_arrival(&self, arrived: &CallRequest, others: &[CallRequest]) -> Vec<AutoResolution> {
        others
            .iter()
            .filter(|c| {
                c.id != arrived.id
                    && c.broadcaster_id == arrived.broadcaster_id
                    && c.is_ringing()
                    && (c.created_at, c.id) < (arrived.created_at, arrived.id)
            })
            .map(|c| AutoResolution {
                id: c.id,
                transition: CallTransition::Supersede,
            })
            .collect()
    }
}

/// Build the policy selected in configuration
pub fn policy_from_config(config: &SignalingConfig) -> Arc<dyn StaleRequestPolicy> {
    match config.stale_policy {
        StalePolicyKind::Legacy => Arc::new(LegacyPolicy),
        StalePolicyKind::Ttl => Arc::new(TtlPolicy::new(config.ringing_ttl())),
        StalePolicyKind::Supersede => Arc::new(SupersedePolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ringing_at(broadcaster_id: Uuid, created_at: DateTime<Utc>) -> CallRequest {
        CallRequest {
            caller_id: Uuid::new_v4(),
            broadcaster_id,
            created_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_legacy_never_resolves() {
        let b = Uuid::new_v4();
        let now = Utc::now();
        let old = ringing_at(b, now - Duration::hours(5));
        let new = ringing_at(b, now);

        assert!(LegacyPolicy.on_arrival(&new, &[old.clone()]).is_empty());
        assert!(LegacyPolicy.sweep_cutoff(now).is_none());
        assert!(LegacyPolicy.sweep(&[old], now).is_empty());
    }

    #[test]
    fn test_ttl_expires_only_old_requests() {
        let b = Uuid::new_v4();
        let now = Utc::now();
        let policy = TtlPolicy::new(std::time::Duration::from_secs(60));

        let old = ringing_at(b, now - Duration::seconds(90));
        let fresh = ringing_at(b, now - Duration::seconds(10));

        let picks = policy.sweep(&[old.clone(), fresh], now);
        assert_eq!(
            picks,
            vec![AutoResolution {
                id: old.id,
                transition: CallTransition::Expire
            }]
        );
        assert_eq!(policy.sweep_cutoff(now), Some(now - Duration::seconds(60)));
    }

    #[test]
    fn test_supersede_rejects_older_ringing_only() {
        let b = Uuid::new_v4();
        let now = Utc::now();
        let older = ringing_at(b, now - Duration::seconds(30));
        let mut answered = ringing_at(b, now - Duration::seconds(20));
        answered.apply(CallTransition::Accept, now).unwrap();
        let arrived = ringing_at(b, now);

        let picks = SupersedePolicy.on_arrival(&arrived, &[older.clone(), answered, arrived.clone()]);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].id, older.id);
        assert_eq!(picks[0].transition, CallTransition::Supersede);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = SignalingConfig::default();
        assert_eq!(policy_from_config(&config).name(), "legacy");

        config.stale_policy = StalePolicyKind::Ttl;
        assert_eq!(policy_from_config(&config).name(), "ttl");

        config.stale_policy = StalePolicyKind::Supersede;
        assert_eq!(policy_from_config(&config).name(), "supersede");
    }
}
