// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stateful quota admission: a per-session token-bucket rate gate (`governor`)
//! and a per-session concurrency gate (`tokio::sync::Semaphore`). Both are
//! created lazily, the first time a session is seen, and cached in a
//! `DashMap` keyed by [`SessionId`].

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::quota::{QuotaDenial, QuotaPolicy};
use crate::domain::session::SessionId;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Held for the lifetime of one in-flight tool call. Dropping it releases
/// the concurrency slot unconditionally, including on an early return or a
/// panic unwind — this is why a `Semaphore` permit was chosen over a
/// manually-released counter.
#[derive(Debug)]
pub struct QuotaAdmission {
    _permit: OwnedSemaphorePermit,
    pub policy: QuotaPolicy,
}

pub struct QuotaEngine {
    default_policy: QuotaPolicy,
    tenant_caps: HashMap<String, QuotaPolicy>,
    rate_limiters: DashMap<SessionId, Arc<DirectLimiter>>,
    concurrency: DashMap<SessionId, Arc<Semaphore>>,
}

impl QuotaEngine {
    pub fn new(default_policy: QuotaPolicy, tenant_caps: HashMap<String, QuotaPolicy>) -> Self {
        Self {
            default_policy,
            tenant_caps,
            rate_limiters: DashMap::new(),
            concurrency: DashMap::new(),
        }
    }

    /// Per-session policy, narrowed to the tenant's cap (if one exists) by
    /// taking the field-wise minimum.
    pub fn resolve_policy(&self, tenant: &str) -> QuotaPolicy {
        match self.tenant_caps.get(tenant) {
            Some(cap) => self.default_policy.capped_by(cap),
            None => self.default_policy.clone(),
        }
    }

    fn rate_limiter_for(&self, session_id: SessionId, policy: &QuotaPolicy) -> Arc<DirectLimiter> {
        Arc::clone(&self.rate_limiters.entry(session_id).or_insert_with(|| {
            let requests = NonZeroU32::new(policy.max_requests_per_window.max(1))
                .expect("max(1) is never zero");
            let period = policy
                .window
                .checked_div(requests.get())
                .unwrap_or(policy.window);
            let quota = Quota::with_period(period)
                .unwrap_or_else(|| Quota::with_period(std::time::Duration::from_millis(1)).unwrap())
                .allow_burst(requests);
            Arc::new(RateLimiter::direct(quota))
        }))
    }

    fn semaphore_for(&self, session_id: SessionId, policy: &QuotaPolicy) -> Arc<Semaphore> {
        Arc::clone(
            &self.concurrency
                .entry(session_id)
                .or_insert_with(|| Arc::new(Semaphore::new(policy.max_concurrent.max(1) as usize))),
        )
    }

    /// Admit one request: check the rate gate, then acquire a concurrency
    /// slot. Both gates share the same resolved policy so a tenant override
    /// narrows both consistently.
    pub async fn admit(
        &self,
        session_id: SessionId,
        tenant: &str,
    ) -> Result<QuotaAdmission, QuotaDenial> {
        let policy = self.resolve_policy(tenant);

        let limiter = self.rate_limiter_for(session_id, &policy);
        if limiter.check().is_err() {
            return Err(QuotaDenial::RateExceeded);
        }

        let semaphore = self.semaphore_for(session_id, &policy);
        let permit = semaphore
            .try_acquire_owned()
            .map_err(|_| QuotaDenial::ConcurrencyExceeded)?;

        Ok(QuotaAdmission {
            _permit: permit,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(max_requests: u32, max_concurrent: u32) -> QuotaPolicy {
        QuotaPolicy {
            window: Duration::from_secs(60),
            max_requests_per_window: max_requests,
            max_concurrent,
            max_result_bytes: 1_000_000,
            max_duration: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn admits_within_policy() {
        let engine = QuotaEngine::new(policy(10, 2), HashMap::new());
        let session = SessionId::new();
        assert!(engine.admit(session, "tenant-a").await.is_ok());
    }

    #[tokio::test]
    async fn rejects_when_rate_exhausted() {
        let engine = QuotaEngine::new(policy(1, 5), HashMap::new());
        let session = SessionId::new();
        let first = engine.admit(session, "tenant-a").await;
        assert!(first.is_ok());
        let second = engine.admit(session, "tenant-a").await;
        assert_eq!(second.unwrap_err(), QuotaDenial::RateExceeded);
    }

    #[tokio::test]
    async fn rejects_when_concurrency_exhausted() {
        let engine = QuotaEngine::new(policy(100, 1), HashMap::new());
        let session = SessionId::new();
        let first = engine.admit(session, "tenant-a").await.unwrap();
        let second = engine.admit(session, "tenant-a").await;
        assert_eq!(second.unwrap_err(), QuotaDenial::ConcurrencyExceeded);
        drop(first);
        assert!(engine.admit(session, "tenant-a").await.is_ok());
    }

    #[tokio::test]
    async fn tenant_cap_narrows_default_policy() {
        let mut caps = HashMap::new();
        caps.insert("tenant-b".to_string(), policy(100, 1));
        let engine = QuotaEngine::new(policy(100, 5), caps);
        let session = SessionId::new();
        let first = engine.admit(session, "tenant-b").await.unwrap();
        let second = engine.admit(session, "tenant-b").await;
        assert_eq!(second.unwrap_err(), QuotaDenial::ConcurrencyExceeded);
        drop(first);
    }
}
