// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concrete implementations of the trait ports domain defines, plus process
//! bootstrap: environment loading, the Postgres adapter, and the audit sink.

pub mod audit_sink;
pub mod bootstrap;
pub mod postgres_adapter;
