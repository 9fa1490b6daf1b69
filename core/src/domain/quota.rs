// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Quota policy and state types. The stateful engine that enforces them
//! lives in [`crate::application::quota_engine`]; this module holds the
//! plain-data shapes it operates on.

use std::time::Duration;

/// Immutable once loaded. Keyed by tenant at the config layer, with a
/// default fallback for tenants without an explicit override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub window: Duration,
    pub max_requests_per_window: u32,
    pub max_concurrent: u32,
    pub max_result_bytes: u64,
    pub max_duration: Duration,
}

impl QuotaPolicy {
    /// Apply a tenant-wide ceiling on top of a session policy: the minimum
    /// of the two on every field, per the resolved open question in
    /// SPEC_FULL.md (§9) that tenant caps bound session policy rather than
    /// replace it.
    pub fn capped_by(&self, tenant_cap: &QuotaPolicy) -> QuotaPolicy {
        QuotaPolicy {
            window: self.window.min(tenant_cap.window),
            max_requests_per_window: self.max_requests_per_window.min(tenant_cap.max_requests_per_window),
            max_concurrent: self.max_concurrent.min(tenant_cap.max_concurrent),
            max_result_bytes: self.max_result_bytes.min(tenant_cap.max_result_bytes),
            max_duration: self.max_duration.min(tenant_cap.max_duration),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenial {
    RateExceeded,
    ConcurrencyExceeded,
}

impl QuotaDenial {
    pub fn code(self) -> &'static str {
        match self {
            Self::RateExceeded => "QUOTA_RATE_EXCEEDED",
            Self::ConcurrencyExceeded => "QUOTA_CONCURRENCY_EXCEEDED",
        }
    }
}
