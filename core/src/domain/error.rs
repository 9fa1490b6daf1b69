// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Unified pipeline error. Every gate in the enforcement pipeline reports
//! failure through this one type so the presentation layer has a single
//! place to map a failure onto a stable wire error code, and so every
//! failure, regardless of which gate raised it, is guaranteed an audit
//! event (§7).

use crate::domain::adapter::AdapterError;
use crate::domain::audit::AuditError;
use crate::domain::capability::{CapabilitySetError, DenialReason};
use crate::domain::quota::QuotaDenial;
use crate::domain::session::{AttachError, BindError, UnboundError};
use crate::domain::sql_validator::ValidationReason;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("session context not verified")]
    SessionNotVerified,
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Unbound(#[from] UnboundError),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error(transparent)]
    CapabilitySet(#[from] CapabilitySetError),
    #[error("authorization denied: {0:?}")]
    Authorization(DenialReason),
    #[error("quota denied: {0:?}")]
    Quota(QuotaDenial),
    #[error("query rejected: {0:?}")]
    Validation(ValidationReason),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("request body failed schema validation: {0}")]
    InputSchema(String),
}

impl PipelineError {
    /// Stable code surfaced on the wire and in audit events. Never includes
    /// interpolated request data — only the fixed set of reasons below.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotVerified => "SECURITY_VIOLATION",
            Self::Bind(BindError::EmptyIdentity) => "INVALID_BINDING",
            Self::Bind(BindError::EmptyTenant) => "INVALID_BINDING",
            Self::Bind(BindError::AlreadyBound) => "SECURITY_VIOLATION",
            Self::Unbound(UnboundError::Unbound) => "UNBOUND_CONTEXT",
            Self::Attach(AttachError::AlreadyAttached) => "ALREADY_ATTACHED",
            Self::CapabilitySet(CapabilitySetError::EmptyCapSetId) => "INVALID_CAPABILITIES",
            Self::CapabilitySet(CapabilitySetError::EmptyIssuer) => "INVALID_CAPABILITIES",
            Self::CapabilitySet(CapabilitySetError::AlreadyExpired) => "INVALID_CAPABILITIES",
            Self::Authorization(reason) => reason.code(),
            Self::Quota(denial) => denial.code(),
            Self::Validation(reason) => reason.code(),
            Self::Adapter(AdapterError::SessionNotVerified) => "SECURITY_VIOLATION",
            Self::Adapter(AdapterError::DeadlineExceeded) => "QUOTA_DEADLINE_EXCEEDED",
            Self::Adapter(AdapterError::ResultExceeded) => "QUOTA_RESULT_EXCEEDED",
            Self::Adapter(AdapterError::Upstream(_)) => "ADAPTER_ERROR",
            Self::Audit(_) => "AUDIT_FAILURE",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::InputSchema(_) => "VALIDATION_ERROR",
        }
    }
}
