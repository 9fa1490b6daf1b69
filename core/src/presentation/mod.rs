// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport/wire surface. Thin by design — see §4.7: this layer must not
//! duplicate any enforcement logic performed by `application`.

pub mod stdio_transport;
