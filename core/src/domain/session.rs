// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session binding and the identity-check discipline that protects it.
//!
//! A [`SessionContext`] is constructed exactly once per process by
//! [`SessionRegistry::bind`] and is immutable thereafter except for a single
//! interior latch ([`std::sync::OnceLock`]) that accepts a [`CapabilitySet`]
//! exactly once. Downstream components never trust a `SessionContext` by
//! shape: they hold it only as the `Arc` handed out by the registry, and the
//! registry verifies *pointer identity* (`Arc::ptr_eq`), not field equality,
//! before treating it as live. A structurally identical clone is rejected.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use uuid::Uuid;

use crate::domain::capability::CapabilitySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindError {
    #[error("identity must be non-empty")]
    EmptyIdentity,
    #[error("tenant must be non-empty")]
    EmptyTenant,
    #[error("session already bound for this process")]
    AlreadyBound,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AttachError {
    #[error("capabilities already attached to this session")]
    AlreadyAttached,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnboundError {
    #[error("no session is bound in this process")]
    Unbound,
}

/// A minimal, safe projection of session fields suitable for an audit record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditFields {
    pub identity: String,
    pub tenant: String,
    pub session_id: SessionId,
    pub cap_set_id: Option<String>,
}

/// The session's immutable trust anchor. Never constructed directly outside
/// this module — see [`SessionRegistry::bind`].
#[derive(Debug)]
pub struct SessionContext {
    identity: String,
    tenant: String,
    session_id: SessionId,
    bound_at_ms: i64,
    capabilities: OnceLock<CapabilitySet>,
}

impl SessionContext {
    fn new(identity: String, tenant: String, session_id: SessionId) -> Self {
        Self {
            identity,
            tenant,
            session_id,
            bound_at_ms: Utc::now().timestamp_millis(),
            capabilities: OnceLock::new(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn bound_at_ms(&self) -> i64 {
        self.bound_at_ms
    }

    pub fn capabilities(&self) -> Option<&CapabilitySet> {
        self.capabilities.get()
    }

    /// Attach a capability set. Succeeds at most once per context.
    pub fn attach_capabilities(&self, cap_set: CapabilitySet) -> Result<(), AttachError> {
        self.capabilities
            .set(cap_set)
            .map_err(|_| AttachError::AlreadyAttached)
    }

    pub fn to_audit_fields(&self) -> AuditFields {
        AuditFields {
            identity: self.identity.clone(),
            tenant: self.tenant.clone(),
            session_id: self.session_id,
            cap_set_id: self.capabilities.get().map(|c| c.cap_set_id.clone()),
        }
    }
}

/// Process-wide record of the single live [`SessionContext`].
///
/// This is the "registered set of live contexts" the design calls for,
/// reduced to its single-session form (the spec's concurrency model
/// explicitly excludes multi-session multiplexing in one process). It is
/// the only place a `SessionContext` can be constructed, and the only place
/// that can authoritatively say a given `Arc<SessionContext>` is the real,
/// live one rather than a look-alike assembled elsewhere.
pub struct SessionRegistry {
    live: OnceLock<Arc<SessionContext>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            live: OnceLock::new(),
        }
    }

    /// Bind the process's one and only session. Fails without mutating any
    /// existing binding if called more than once.
    pub fn bind(
        &self,
        identity: &str,
        tenant: &str,
        session_id: SessionId,
    ) -> Result<Arc<SessionContext>, BindError> {
        if identity.trim().is_empty() {
            return Err(BindError::EmptyIdentity);
        }
        if tenant.trim().is_empty() {
            return Err(BindError::EmptyTenant);
        }
        let ctx = Arc::new(SessionContext::new(
            identity.to_string(),
            tenant.to_string(),
            session_id,
        ));
        self.live.set(ctx).map_err(|_| BindError::AlreadyBound)?;
        // Safe: we just set it, or the set above returned Err and we bailed.
        Ok(Arc::clone(self.live.get().expect("just bound")))
    }

    pub fn assert_bound(&self) -> Result<&Arc<SessionContext>, UnboundError> {
        self.live.get().ok_or(UnboundError::Unbound)
    }

    /// The identity check downstream components are required to perform:
    /// pointer equality against the registry's single live context, never
    /// field-by-field comparison.
    pub fn verify(&self, candidate: &Arc<SessionContext>) -> bool {
        match self.live.get() {
            Some(live) => Arc::ptr_eq(live, candidate),
            None => false,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_rejects_empty_identity() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.bind("", "tenant", SessionId::new()).unwrap_err(),
            BindError::EmptyIdentity
        );
    }

    #[test]
    fn bind_rejects_whitespace_tenant() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry
                .bind("u@e", "   ", SessionId::new())
                .unwrap_err(),
            BindError::EmptyTenant
        );
    }

    #[test]
    fn rebinding_fails_and_preserves_original() {
        let registry = SessionRegistry::new();
        let first = registry.bind("alice", "t1", SessionId::new()).unwrap();
        let err = registry
            .bind("mallory", "t2", SessionId::new())
            .unwrap_err();
        assert_eq!(err, BindError::AlreadyBound);
        assert_eq!(registry.assert_bound().unwrap().identity(), "alice");
        assert_eq!(first.identity(), "alice");
    }

    #[test]
    fn verify_rejects_structurally_identical_lookalike() {
        let registry = SessionRegistry::new();
        let real = registry.bind("alice", "t1", SessionId::new()).unwrap();
        let lookalike = Arc::new(SessionContext::new(
            "alice".to_string(),
            "t1".to_string(),
            real.session_id(),
        ));
        assert!(registry.verify(&real));
        assert!(!registry.verify(&lookalike));
    }

    #[test]
    fn attach_capabilities_succeeds_once() {
        use crate::domain::capability::{CapabilitySet, Grant, CapabilityAction};
        let registry = SessionRegistry::new();
        let ctx = registry.bind("alice", "t1", SessionId::new()).unwrap();
        let cap_set = CapabilitySet {
            cap_set_id: "c1".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            issuer: "launcher".to_string(),
            grants: vec![Grant {
                action: CapabilityAction::ToolInvoke,
                target: "*".to_string(),
            }],
        };
        assert!(ctx.attach_capabilities(cap_set.clone()).is_ok());
        assert_eq!(
            ctx.attach_capabilities(cap_set).unwrap_err(),
            AttachError::AlreadyAttached
        );
    }

    #[test]
    fn assert_bound_fails_before_binding() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.assert_bound().unwrap_err(), UnboundError::Unbound);
    }
}
