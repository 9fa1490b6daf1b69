// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # gatekeeper-core
//!
//! Control-plane enforcement pipeline for a security-gated tool-execution
//! server. A client request against a registered tool must pass, in fixed
//! order and fail-closed, four gates before a database adapter is touched:
//!
//! 1. the session carries a verified [`domain::session::SessionContext`],
//! 2. the session's [`domain::capability::CapabilitySet`] grants the action,
//! 3. the request fits the tenant/session [`domain::quota`] policy,
//! 4. any SQL the tool produces passes [`domain::sql_validator`].
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   ← stdio transport loop (stand-in for a real JSON-RPC transport)
//!     ↓
//! application/    ← ToolRegistry enforcement pipeline, stateful QuotaEngine
//!     ↓
//! domain/         ← SessionContext, CapabilitySet, CapabilityEngine, validator, errors
//!     ↓
//! infrastructure/ ← environment bootstrap, tracing-backed audit sink, Postgres adapter
//! ```
//!
//! Nothing above the domain layer may bypass it: there is exactly one path
//! into the adapter, [`application::registry::ToolRegistry::execute_tool`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
