// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process entrypoint: load configuration, bind the session, assemble the
//! tool catalog, and run the stdio transport loop until stdin closes.

use std::collections::HashSet;
use std::sync::Arc;

use gatekeeper_core::application::quota_engine::QuotaEngine;
use gatekeeper_core::application::registry::ToolRegistry;
use gatekeeper_core::domain::capability::CapabilityAction;
use gatekeeper_core::domain::session::SessionRegistry;
use gatekeeper_core::domain::tool::ToolDescriptor;
use gatekeeper_core::infrastructure::audit_sink::JsonLinesAuditSink;
use gatekeeper_core::infrastructure::bootstrap;
use gatekeeper_core::infrastructure::postgres_adapter::PostgresAdapter;
use gatekeeper_core::presentation::stdio_transport::StdioTransport;

/// The deployment's fixed tool catalog. Each entry's `allowed_order_by_columns`
/// is the trust boundary the static validator enforces on every call.
fn tool_catalog() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor {
        name: "query_read".to_string(),
        description: "Run a read-only, pre-vetted SELECT against the tenant's database.".to_string(),
        required_action: CapabilityAction::ToolInvoke,
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" }
            },
            "required": ["sql"]
        }),
        produces_sql: true,
        allowed_order_by_columns: HashSet::from([
            "public.users.id".to_string(),
            "public.orders.created_at".to_string(),
        ]),
    }]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();

    let config = match bootstrap::load_server_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "startup configuration failed");
            std::process::exit(1);
        }
    };

    let session_registry = Arc::new(SessionRegistry::new());
    let ctx = match bootstrap::bootstrap_session(&session_registry) {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::error!(error = %err, "session bootstrap failed");
            std::process::exit(1);
        }
    };

    let adapter = PostgresAdapter::connect(&config.database_url, Arc::clone(&session_registry))
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to database: {e}"))?;

    let audit_sink = JsonLinesAuditSink::new(tokio::io::stderr());

    let quota_engine = QuotaEngine::new(config.quota_default, config.quota_tenant_overrides);

    let registry = Arc::new(ToolRegistry::new(
        Arc::clone(&session_registry),
        tool_catalog(),
        quota_engine,
        Arc::new(adapter),
        Arc::new(audit_sink),
        config.audit_secret,
    )?);

    let transport = StdioTransport::new(registry, ctx);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    transport.run(stdin, tokio::io::stdout()).await?;

    Ok(())
}
