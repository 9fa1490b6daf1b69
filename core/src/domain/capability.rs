// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Capability grants and the pure evaluation function that turns
//! `(capability set, action, target)` into an allow/deny decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of actions a grant can authorize. Any action name outside this
/// set deterministically denies rather than being treated as unknown-but-ok.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityAction {
    #[serde(rename = "tool.invoke")]
    ToolInvoke,
    #[serde(rename = "tool.list")]
    ToolList,
    #[serde(rename = "resource.read")]
    ResourceRead,
    #[serde(rename = "resource.write")]
    ResourceWrite,
}

impl CapabilityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolInvoke => "tool.invoke",
            Self::ToolList => "tool.list",
            Self::ResourceRead => "resource.read",
            Self::ResourceWrite => "resource.write",
        }
    }
}

impl std::str::FromStr for CapabilityAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool.invoke" => Ok(Self::ToolInvoke),
            "tool.list" => Ok(Self::ToolList),
            "resource.read" => Ok(Self::ResourceRead),
            "resource.write" => Ok(Self::ResourceWrite),
            _ => Err(()),
        }
    }
}

/// A single `(action, target)` permission. `target` is a tool name or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub action: CapabilityAction,
    pub target: String,
}

/// Capability set issued by the trusted launcher and attached to a bound
/// session exactly once. Frozen after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub cap_set_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub grants: Vec<Grant>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilitySetError {
    #[error("capSetId must be non-empty")]
    EmptyCapSetId,
    #[error("issuer must be non-empty")]
    EmptyIssuer,
    #[error("expiresAt must be strictly after the construction time")]
    AlreadyExpired,
}

impl CapabilitySet {
    /// Construct from already-parsed fields, enforcing the invariants that
    /// apply at construction time (field presence, non-expiry). Schema
    /// parsing itself happens in `infrastructure::bootstrap`.
    pub fn new(
        cap_set_id: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        issuer: String,
        grants: Vec<Grant>,
    ) -> Result<Self, CapabilitySetError> {
        if cap_set_id.trim().is_empty() {
            return Err(CapabilitySetError::EmptyCapSetId);
        }
        if issuer.trim().is_empty() {
            return Err(CapabilitySetError::EmptyIssuer);
        }
        if expires_at <= Utc::now() {
            return Err(CapabilitySetError::AlreadyExpired);
        }
        Ok(Self {
            cap_set_id,
            issued_at,
            expires_at,
            issuer,
            grants,
        })
    }
}

/// Stable reason codes surfaced in audit events and (sanitized) client
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    NoCapabilities,
    UnknownAction,
    Expired,
    NoGrant,
}

impl DenialReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NoCapabilities => "DENIED_NO_CAPABILITIES",
            Self::UnknownAction => "DENIED_UNKNOWN_ACTION",
            Self::Expired => "DENIED_EXPIRED",
            Self::NoGrant => "DENIED_NO_GRANT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityDecision {
    Granted,
    Denied(DenialReason),
}

impl CapabilityDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn reason_code(self) -> &'static str {
        match self {
            Self::Granted => "GRANTED",
            Self::Denied(r) => r.code(),
        }
    }
}

/// Pure evaluation: the only inputs are the capability set, the action, the
/// target, and the current time. No hidden state, no I/O.
pub struct CapabilityEngine;

impl CapabilityEngine {
    pub fn evaluate(
        cap_set: Option<&CapabilitySet>,
        action: CapabilityAction,
        target: &str,
        now: DateTime<Utc>,
    ) -> CapabilityDecision {
        let Some(cap_set) = cap_set else {
            return CapabilityDecision::Denied(DenialReason::NoCapabilities);
        };

        // `action` arrives already typed as a known CapabilityAction (it was
        // parsed by the caller); an unparseable action string is handled by
        // the caller mapping straight to DENIED_UNKNOWN_ACTION before this
        // function is ever invoked. We still guard the expiry and grant scan
        // here so this function alone is a complete, testable decision
        // procedure for any valid action value.
        if cap_set.expires_at <= now {
            return CapabilityDecision::Denied(DenialReason::Expired);
        }

        let authorized = cap_set.grants.iter().any(|grant| {
            grant.action == action && (grant.target == target || grant.target == "*")
        });

        if authorized {
            CapabilityDecision::Granted
        } else {
            CapabilityDecision::Denied(DenialReason::NoGrant)
        }
    }

    /// Entry point used by the pipeline, which must also handle an action
    /// string that fails to parse into a [`CapabilityAction`] at all.
    pub fn evaluate_str_action(
        cap_set: Option<&CapabilitySet>,
        action: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> CapabilityDecision {
        match action.parse::<CapabilityAction>() {
            Ok(action) => Self::evaluate(cap_set, action, target, now),
            Err(()) => CapabilityDecision::Denied(DenialReason::UnknownAction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cap_set(grants: Vec<Grant>, expires_in: Duration) -> CapabilitySet {
        CapabilitySet {
            cap_set_id: "c1".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + expires_in,
            issuer: "launcher".to_string(),
            grants,
        }
    }

    #[test]
    fn absent_capabilities_deny() {
        let decision = CapabilityEngine::evaluate(None, CapabilityAction::ToolInvoke, "x", Utc::now());
        assert_eq!(decision, CapabilityDecision::Denied(DenialReason::NoCapabilities));
    }

    #[test]
    fn expired_denies_regardless_of_grants() {
        let cs = cap_set(
            vec![Grant {
                action: CapabilityAction::ToolInvoke,
                target: "*".to_string(),
            }],
            Duration::seconds(-1),
        );
        // construction itself would reject this via CapabilitySet::new, but
        // evaluate() must independently enforce expiry too.
        let decision =
            CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolInvoke, "query_read", Utc::now());
        assert_eq!(decision, CapabilityDecision::Denied(DenialReason::Expired));
    }

    #[test]
    fn expires_at_equal_now_denies() {
        let now = Utc::now();
        let cs = CapabilitySet {
            cap_set_id: "c1".to_string(),
            issued_at: now,
            expires_at: now,
            issuer: "launcher".to_string(),
            grants: vec![Grant {
                action: CapabilityAction::ToolInvoke,
                target: "*".to_string(),
            }],
        };
        let decision = CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolInvoke, "t", now);
        assert_eq!(decision, CapabilityDecision::Denied(DenialReason::Expired));
    }

    #[test]
    fn exact_target_grants() {
        let cs = cap_set(
            vec![Grant {
                action: CapabilityAction::ToolInvoke,
                target: "query_read".to_string(),
            }],
            Duration::hours(1),
        );
        let decision =
            CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolInvoke, "query_read", Utc::now());
        assert_eq!(decision, CapabilityDecision::Granted);
    }

    #[test]
    fn wildcard_target_grants_but_not_across_actions() {
        let cs = cap_set(
            vec![Grant {
                action: CapabilityAction::ToolList,
                target: "*".to_string(),
            }],
            Duration::hours(1),
        );
        assert_eq!(
            CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolList, "query_read", Utc::now()),
            CapabilityDecision::Granted
        );
        assert_eq!(
            CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolInvoke, "query_read", Utc::now()),
            CapabilityDecision::Denied(DenialReason::NoGrant)
        );
    }

    #[test]
    fn unknown_action_string_denies() {
        let cs = cap_set(vec![], Duration::hours(1));
        let decision = CapabilityEngine::evaluate_str_action(Some(&cs), "tool.delete", "x", Utc::now());
        assert_eq!(decision, CapabilityDecision::Denied(DenialReason::UnknownAction));
    }

    #[test]
    fn no_matching_grant_denies() {
        let cs = cap_set(
            vec![Grant {
                action: CapabilityAction::ToolInvoke,
                target: "other_tool".to_string(),
            }],
            Duration::hours(1),
        );
        let decision =
            CapabilityEngine::evaluate(Some(&cs), CapabilityAction::ToolInvoke, "query_read", Utc::now());
        assert_eq!(decision, CapabilityDecision::Denied(DenialReason::NoGrant));
    }

    #[test]
    fn construction_rejects_already_expired() {
        let err = CapabilitySet::new(
            "c1".to_string(),
            Utc::now(),
            Utc::now() - Duration::seconds(1),
            "launcher".to_string(),
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, CapabilitySetError::AlreadyExpired);
    }
}
