// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The trust boundary a validated query crosses to actually touch a
//! database. An [`Adapter`] is invoked only after every gate upstream of it
//! has already passed — it does no authorization of its own, but it does
//! re-verify the session handle it is given, since it is the last place a
//! forged or stale handle could still do damage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::session::SessionContext;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("session handle failed re-verification at the adapter boundary")]
    SessionNotVerified,
    /// Deadline breach during execution. Maps to `QUOTA_DEADLINE_EXCEEDED`,
    /// not an `ADAPTER_*` category, per the error taxonomy: timeouts are a
    /// quota concern even though the adapter is what detects them.
    #[error("query exceeded the allotted duration")]
    DeadlineExceeded,
    /// Maps to `QUOTA_RESULT_EXCEEDED` for the same reason.
    #[error("result exceeded the allotted byte budget")]
    ResultExceeded,
    #[error("underlying datastore rejected the query: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Held as the same `Arc` the registry holds, so an implementation can
    /// re-verify it against the session registry by pointer identity rather
    /// than trusting a copied id.
    pub session: Arc<SessionContext>,
    /// Already fully validated by [`crate::domain::sql_validator`] — a
    /// complete, literal `SELECT` statement, never a template.
    pub sql: String,
    pub max_duration: Duration,
    pub max_result_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub rows: Vec<serde_json::Value>,
    pub byte_size: u64,
}

/// Executes a pre-validated, pre-authorized query against a concrete
/// datastore. Implementations must re-verify the caller's session handle
/// before touching the network and must enforce `max_duration` and
/// `max_result_bytes` themselves — the pipeline upstream only decided the
/// request is *allowed*, not that the datastore will behave.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn execute(&self, request: QueryRequest) -> Result<QueryResponse, AdapterError>;
}
