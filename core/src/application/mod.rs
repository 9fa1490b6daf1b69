// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Use-case orchestration: stateful services that coordinate the pure
//! domain types against the trait ports domain defines, without themselves
//! doing I/O beyond calling those ports.

pub mod quota_engine;
pub mod registry;
