// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Audit event shape and the deterministic query fingerprint function.
//!
//! An [`AuditEvent`] is the only record of a pipeline decision and never
//! carries raw SQL, parameter values, or secrets — only a [`QueryFingerprint`]
//! that identifies a query's *shape*, salted per-process so fingerprints
//! from two different deployments are never comparable.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::domain::session::{AuditFields, SessionId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Allowed,
    Denied,
}

/// 256-bit HMAC of a canonicalized query shape. Not reversible; stable
/// across requests sharing the same shape and secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFingerprint(pub String);

/// Lowercases keywords, collapses whitespace, and strips comments — the same
/// normalization the validator performs to detect comments in the first
/// place, reused here so the fingerprint is computed over the same
/// canonical shape the validator reasoned about.
pub fn canonicalize_sql_shape(sql: &str) -> String {
    let without_line_comments: String = sql
        .lines()
        .map(|line| {
            let cut = line.find("--").map(|i| &line[..i]).unwrap_or(line);
            let cut = cut.find('#').map(|i| &cut[..i]).unwrap_or(cut);
            cut
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut without_block_comments = String::with_capacity(without_line_comments.len());
    let mut rest = without_line_comments.as_str();
    while let Some(start) = rest.find("/*") {
        without_block_comments.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    without_block_comments.push_str(rest);

    without_block_comments
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn fingerprint(secret: &[u8], sql: &str) -> QueryFingerprint {
    let shape = canonicalize_sql_shape(sql);
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(shape.as_bytes());
    QueryFingerprint(hex::encode(mac.finalize().into_bytes()))
}

/// Append-only audit record. Every field that could leak sensitive content
/// (the raw SQL text, parameter values, any secret) is deliberately absent
/// from this type — there is no field to accidentally populate with it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub level: &'static str,
    pub identity: String,
    pub tenant: String,
    pub session_id: SessionId,
    pub cap_set_id: Option<String>,
    pub action: String,
    pub target: String,
    pub authorized: bool,
    pub reason: String,
    pub duration_ms: Option<u64>,
    pub query_fingerprint: Option<QueryFingerprint>,
    pub adapter: Option<String>,
    pub outcome: Outcome,
}

impl AuditEvent {
    pub fn builder(fields: &AuditFields, action: &str, target: &str) -> AuditEventBuilder {
        AuditEventBuilder {
            identity: fields.identity.clone(),
            tenant: fields.tenant.clone(),
            session_id: fields.session_id,
            cap_set_id: fields.cap_set_id.clone(),
            action: action.to_string(),
            target: target.to_string(),
            authorized: false,
            reason: String::new(),
            duration_ms: None,
            query_fingerprint: None,
            adapter: None,
            outcome: Outcome::Denied,
        }
    }
}

pub struct AuditEventBuilder {
    identity: String,
    tenant: String,
    session_id: SessionId,
    cap_set_id: Option<String>,
    action: String,
    target: String,
    authorized: bool,
    reason: String,
    duration_ms: Option<u64>,
    query_fingerprint: Option<QueryFingerprint>,
    adapter: Option<String>,
    outcome: Outcome,
}

impl AuditEventBuilder {
    pub fn outcome(mut self, outcome: Outcome, authorized: bool, reason: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.authorized = authorized;
        self.reason = reason.into();
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn query_fingerprint(mut self, fp: QueryFingerprint) -> Self {
        self.query_fingerprint = Some(fp);
        self
    }

    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            ts: Utc::now(),
            level: match self.outcome {
                Outcome::Allowed => "info",
                Outcome::Denied => "warn",
            },
            identity: self.identity,
            tenant: self.tenant,
            session_id: self.session_id,
            cap_set_id: self.cap_set_id,
            action: self.action,
            target: self.target,
            authorized: self.authorized,
            reason: self.reason,
            duration_ms: self.duration_ms,
            query_fingerprint: self.query_fingerprint,
            adapter: self.adapter,
            outcome: self.outcome,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink refused event: {0}")]
pub struct AuditError(pub String);

/// Append-only structured event emitter. Implementations must never drop an
/// event silently — a refusal must surface as `Err` so the pipeline can
/// fail closed (§7 `AUDIT_FAILURE`).
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let sql = "SELECT u.id FROM public.users u -- trailing comment\nORDER BY u.id ASC";
        let a = fingerprint(b"secret-at-least-32-bytes-long!!", sql);
        let b = fingerprint(b"secret-at-least-32-bytes-long!!", sql);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_ignores_comments_and_whitespace() {
        let a = fingerprint(b"k", "SELECT u.id   FROM public.users u");
        let b = fingerprint(b"k", "select u.id from public.users u -- comment\n");
        assert_eq!(a, b);
    }

    #[test]
    fn different_secrets_produce_different_fingerprints() {
        let sql = "SELECT u.id FROM public.users u";
        let a = fingerprint(b"secret-one", sql);
        let b = fingerprint(b"secret-two", sql);
        assert_ne!(a, b);
    }

    #[test]
    fn different_shapes_produce_different_fingerprints() {
        let a = fingerprint(b"k", "SELECT u.id FROM public.users u");
        let b = fingerprint(b"k", "SELECT u.name FROM public.users u");
        assert_ne!(a, b);
    }
}
