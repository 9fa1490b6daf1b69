// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process startup: reads the trusted launcher's environment, binds the
//! process's one session, attaches its capabilities, and assembles the
//! quota policy. Every failure here is fatal — the caller is expected to
//! exit the process with status `1` rather than run with a partial or
//! guessed configuration.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::capability::{CapabilitySet, CapabilitySetError, Grant};
use crate::domain::quota::QuotaPolicy;
use crate::domain::session::{AttachError, BindError, SessionContext, SessionId, SessionRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("AUDIT_SECRET is not set")]
    MissingAuditSecret,
    #[error("AUDIT_SECRET must be at least 32 bytes of entropy")]
    AuditSecretTooShort,
    #[error("MCP_CAPABILITIES is not valid JSON or fails the expected shape: {0}")]
    MalformedCapabilities(String),
    #[error("QUOTA_TENANT_OVERRIDES is not valid JSON or fails the expected shape: {0}")]
    MalformedQuotaOverrides(String),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error(transparent)]
    CapabilitySet(#[from] CapabilitySetError),
}

/// Wire shape of `MCP_CAPABILITIES` and of each value in
/// `QUOTA_TENANT_OVERRIDES`'s partial policy objects.
#[derive(Debug, Deserialize)]
struct RawCapabilitySet {
    cap_set_id: String,
    issued_at: chrono::DateTime<chrono::Utc>,
    expires_at: chrono::DateTime<chrono::Utc>,
    issuer: String,
    grants: Vec<Grant>,
}

#[derive(Debug, Deserialize)]
struct RawQuotaOverride {
    window_ms: Option<u64>,
    max_requests: Option<u32>,
    max_concurrent: Option<u32>,
    max_result_bytes: Option<u64>,
    max_duration_ms: Option<u64>,
}

pub struct ServerConfig {
    pub database_url: String,
    pub audit_secret: Vec<u8>,
    pub quota_default: QuotaPolicy,
    pub quota_tenant_overrides: HashMap<String, QuotaPolicy>,
}

const DEFAULT_WINDOW_MS: u64 = 60_000;
const DEFAULT_MAX_REQUESTS: u32 = 120;
const DEFAULT_MAX_CONCURRENT: u32 = 4;
const DEFAULT_MAX_RESULT_BYTES: u64 = 5_000_000;
const DEFAULT_MAX_DURATION_MS: u64 = 10_000;

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Installs the global `tracing` subscriber. Reads `RUST_LOG`, falling back
/// to `AEGIS_LOG_LEVEL`, falling back to `info`. Pretty-printed outside of
/// production, structured JSON when `AEGIS_ENV=production`.
pub fn init_tracing() {
    let filter = env::var("RUST_LOG")
        .or_else(|_| env::var("AEGIS_LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if env::var("AEGIS_ENV").as_deref() == Ok("production") {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

pub fn load_server_config() -> Result<ServerConfig, ConfigError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

    let audit_secret = env::var("AUDIT_SECRET").map_err(|_| ConfigError::MissingAuditSecret)?;
    if audit_secret.len() < 32 {
        return Err(ConfigError::AuditSecretTooShort);
    }

    let quota_default = QuotaPolicy {
        window: Duration::from_millis(env_u64("QUOTA_DEFAULT_WINDOW_MS", DEFAULT_WINDOW_MS)),
        max_requests_per_window: env_u32("QUOTA_DEFAULT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS),
        max_concurrent: env_u32("QUOTA_DEFAULT_MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT),
        max_result_bytes: env_u64("QUOTA_DEFAULT_MAX_RESULT_BYTES", DEFAULT_MAX_RESULT_BYTES),
        max_duration: Duration::from_millis(env_u64("QUOTA_DEFAULT_MAX_DURATION_MS", DEFAULT_MAX_DURATION_MS)),
    };

    let quota_tenant_overrides = match env::var("QUOTA_TENANT_OVERRIDES") {
        Ok(raw) => {
            let parsed: HashMap<String, RawQuotaOverride> = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::MalformedQuotaOverrides(e.to_string()))?;
            parsed
                .into_iter()
                .map(|(tenant, raw)| {
                    let policy = QuotaPolicy {
                        window: raw
                            .window_ms
                            .map(Duration::from_millis)
                            .unwrap_or(quota_default.window),
                        max_requests_per_window: raw
                            .max_requests
                            .unwrap_or(quota_default.max_requests_per_window),
                        max_concurrent: raw.max_concurrent.unwrap_or(quota_default.max_concurrent),
                        max_result_bytes: raw
                            .max_result_bytes
                            .unwrap_or(quota_default.max_result_bytes),
                        max_duration: raw
                            .max_duration_ms
                            .map(Duration::from_millis)
                            .unwrap_or(quota_default.max_duration),
                    };
                    (tenant, policy)
                })
                .collect()
        }
        Err(_) => HashMap::new(),
    };

    Ok(ServerConfig {
        database_url,
        audit_secret: audit_secret.into_bytes(),
        quota_default,
        quota_tenant_overrides,
    })
}

/// Reads `MCP_SESSION_IDENTITY`, `MCP_SESSION_TENANT`, and `MCP_CAPABILITIES`
/// from the trusted launcher's environment, binds the process's one
/// session, and attaches its capabilities. This is the only place a
/// `SessionContext` is ever produced for the running process.
pub fn bootstrap_session(registry: &SessionRegistry) -> Result<Arc<SessionContext>, ConfigError> {
    let identity = env::var("MCP_SESSION_IDENTITY").unwrap_or_default();
    let tenant = env::var("MCP_SESSION_TENANT").unwrap_or_default();

    let ctx = registry.bind(&identity, &tenant, SessionId::new())?;

    if let Ok(raw) = env::var("MCP_CAPABILITIES") {
        if !raw.trim().is_empty() {
            let parsed: RawCapabilitySet = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::MalformedCapabilities(e.to_string()))?;
            let cap_set = CapabilitySet::new(
                parsed.cap_set_id,
                parsed.issued_at,
                parsed.expires_at,
                parsed.issuer,
                parsed.grants,
            )?;
            ctx.attach_capabilities(cap_set)?;
        }
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_session_rejects_empty_identity() {
        let registry = SessionRegistry::new();
        env::remove_var("MCP_SESSION_IDENTITY");
        env::remove_var("MCP_SESSION_TENANT");
        env::remove_var("MCP_CAPABILITIES");
        let err = bootstrap_session(&registry).unwrap_err();
        assert!(matches!(err, ConfigError::Bind(BindError::EmptyIdentity)));
    }
}
