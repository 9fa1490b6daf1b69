// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool descriptors: the catalog entries a bound session can discover and
//! invoke, each naming the capability action it requires and, for
//! SQL-producing tools, the allowlist their `ORDER BY` clause must satisfy.
//!
//! A tool's SQL is not a fixed template: the caller supplies the full
//! `SELECT` statement as a tool argument, and it is validated fresh on
//! every call by [`crate::domain::sql_validator::StaticSqlValidator`] before
//! it ever reaches an adapter.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::domain::capability::CapabilityAction;

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub required_action: CapabilityAction,
    pub input_schema: Value,
    /// Whether this tool's call arguments carry a literal `sql` statement
    /// that must pass static SQL validation. `false` for tools with no SQL
    /// surface at all, for which pipeline step 5 is a no-op.
    pub produces_sql: bool,
    /// Ignored when `produces_sql` is `false`.
    pub allowed_order_by_columns: HashSet<String>,
}

/// The subset of a [`ToolDescriptor`] safe to hand back over the wire from
/// `tools/list` — no allowlist internals.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_omits_allowlist() {
        let tool = ToolDescriptor {
            name: "query_read".to_string(),
            description: "run a read-only SELECT against the tenant's database".to_string(),
            required_action: CapabilityAction::ToolInvoke,
            input_schema: serde_json::json!({"type": "object"}),
            produces_sql: true,
            allowed_order_by_columns: HashSet::from(["public.users.id".to_string()]),
        };
        let summary = serde_json::to_value(tool.summary()).unwrap();
        assert!(summary.get("allowed_order_by_columns").is_none());
        assert_eq!(summary["name"], "query_read");
    }
}
