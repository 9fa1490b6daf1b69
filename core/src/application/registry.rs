// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The tool registry: the single entry point that runs every request
//! through the fixed, fail-closed gate order — context verification
//! (by object identity against the [`SessionRegistry`] that bound it),
//! authorization, quota admission, input validation, static SQL validation,
//! adapter invocation, then audit — and never lets a later gate run before
//! an earlier one has passed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use jsonschema::Validator;

use crate::domain::adapter::{Adapter, AdapterError, QueryRequest, QueryResponse};
use crate::domain::audit::{AuditEvent, AuditSink, Outcome};
use crate::domain::capability::{CapabilityAction, CapabilityEngine};
use crate::domain::error::PipelineError;
use crate::domain::session::{SessionContext, SessionRegistry};
use crate::domain::sql_validator::StaticSqlValidator;
use crate::domain::tool::{ToolDescriptor, ToolSummary};

use crate::application::quota_engine::QuotaEngine;

struct CompiledTool {
    descriptor: ToolDescriptor,
    schema: Validator,
}

pub struct ToolRegistry {
    session_registry: Arc<SessionRegistry>,
    tools: HashMap<String, CompiledTool>,
    quota_engine: QuotaEngine,
    adapter: Arc<dyn Adapter>,
    audit_sink: Arc<dyn AuditSink>,
    fingerprint_secret: Vec<u8>,
}

impl ToolRegistry {
    pub fn new(
        session_registry: Arc<SessionRegistry>,
        tools: Vec<ToolDescriptor>,
        quota_engine: QuotaEngine,
        adapter: Arc<dyn Adapter>,
        audit_sink: Arc<dyn AuditSink>,
        fingerprint_secret: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        let mut compiled = HashMap::with_capacity(tools.len());
        for descriptor in tools {
            let schema = jsonschema::validator_for(&descriptor.input_schema)
                .map_err(|e| PipelineError::InputSchema(e.to_string()))?;
            compiled.insert(
                descriptor.name.clone(),
                CompiledTool { descriptor, schema },
            );
        }
        Ok(Self {
            session_registry,
            tools: compiled,
            quota_engine,
            adapter,
            audit_sink,
            fingerprint_secret,
        })
    }

    /// `tools/list`: gated by an explicit `tool.list` grant for *any*
    /// target (including `*`). Absent that grant the result is an empty
    /// list, not an authorization error — listing is not itself a
    /// capability-bearing action on any one tool. Present grants are then
    /// filtered per-tool by that tool's own required action.
    pub fn list_tools(&self, ctx: &Arc<SessionContext>) -> Vec<ToolSummary> {
        let now = Utc::now();
        let cap_set = ctx.capabilities();

        let has_list_grant = cap_set
            .map(|cs| {
                cs.expires_at > now
                    && cs
                        .grants
                        .iter()
                        .any(|grant| grant.action == CapabilityAction::ToolList)
            })
            .unwrap_or(false);

        if !has_list_grant {
            return Vec::new();
        }

        self.tools
            .values()
            .filter(|tool| {
                CapabilityEngine::evaluate(
                    cap_set,
                    tool.descriptor.required_action,
                    &tool.descriptor.name,
                    now,
                )
                .is_granted()
            })
            .map(|tool| tool.descriptor.summary())
            .collect()
    }

    /// `tools/call`: the full gated pipeline.
    pub async fn execute_tool(
        &self,
        ctx: &Arc<SessionContext>,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<QueryResponse, PipelineError> {
        let started = Instant::now();
        let audit_fields = ctx.to_audit_fields();

        if !self.session_registry.verify(ctx) {
            let event = AuditEvent::builder(&audit_fields, "session.verify", tool_name)
                .outcome(Outcome::Denied, false, "SECURITY_VIOLATION")
                .build();
            self.audit_sink.emit(event).await?;
            return Err(PipelineError::SessionNotVerified);
        }

        let tool = match self.tools.get(tool_name) {
            Some(tool) => tool,
            None => {
                let event = AuditEvent::builder(&audit_fields, "tool.invoke", tool_name)
                    .outcome(Outcome::Denied, false, "TOOL_NOT_FOUND")
                    .build();
                self.audit_sink.emit(event).await?;
                return Err(PipelineError::ToolNotFound(tool_name.to_string()));
            }
        };

        let now = Utc::now();
        let decision = CapabilityEngine::evaluate(
            ctx.capabilities(),
            tool.descriptor.required_action,
            tool_name,
            now,
        );
        if !decision.is_granted() {
            let event = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                .outcome(Outcome::Denied, false, decision.reason_code())
                .build();
            self.audit_sink.emit(event).await?;
            return Err(PipelineError::Authorization(match decision {
                crate::domain::capability::CapabilityDecision::Denied(reason) => reason,
                crate::domain::capability::CapabilityDecision::Granted => unreachable!(),
            }));
        }

        let admission = match self.quota_engine.admit(ctx.session_id(), ctx.tenant()).await {
            Ok(admission) => admission,
            Err(denial) => {
                let event = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                    .outcome(Outcome::Denied, true, denial.code())
                    .build();
                self.audit_sink.emit(event).await?;
                return Err(PipelineError::Quota(denial));
            }
        };

        if let Err(error) = tool.schema.validate(arguments) {
            let message = error.to_string();
            let event = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                .outcome(Outcome::Denied, true, "VALIDATION_ERROR")
                .build();
            self.audit_sink.emit(event).await?;
            return Err(PipelineError::InputSchema(message));
        }

        // Step 5 applies only to tools whose call arguments carry a literal
        // SQL statement; other tools skip straight to invocation.
        let sql = if tool.descriptor.produces_sql {
            let sql = match arguments.get("sql").and_then(serde_json::Value::as_str) {
                Some(sql) => sql,
                None => {
                    let event = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                        .outcome(Outcome::Denied, true, "VALIDATION_ERROR")
                        .build();
                    self.audit_sink.emit(event).await?;
                    return Err(PipelineError::InputSchema("arguments.sql must be a string".to_string()));
                }
            };

            if let Err(reason) = StaticSqlValidator::validate(sql, &tool.descriptor.allowed_order_by_columns) {
                let fingerprint = crate::domain::audit::fingerprint(&self.fingerprint_secret, sql);
                let event = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                    .outcome(Outcome::Denied, true, reason.code())
                    .query_fingerprint(fingerprint)
                    .build();
                self.audit_sink.emit(event).await?;
                return Err(PipelineError::Validation(reason));
            }

            sql.to_string()
        } else {
            String::new()
        };

        let fingerprint = tool
            .descriptor
            .produces_sql
            .then(|| crate::domain::audit::fingerprint(&self.fingerprint_secret, &sql));

        let request = QueryRequest {
            session: Arc::clone(ctx),
            sql,
            max_duration: admission.policy.max_duration,
            max_result_bytes: admission.policy.max_result_bytes,
        };

        let result = self.adapter.execute(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let mut builder = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                    .outcome(Outcome::Allowed, true, "OK")
                    .duration_ms(elapsed_ms)
                    .adapter("postgres");
                if let Some(fp) = fingerprint {
                    builder = builder.query_fingerprint(fp);
                }
                self.audit_sink.emit(builder.build()).await?;
                Ok(response)
            }
            Err(err) => {
                let reason = match &err {
                    AdapterError::SessionNotVerified => "SECURITY_VIOLATION",
                    AdapterError::DeadlineExceeded => "QUOTA_DEADLINE_EXCEEDED",
                    AdapterError::ResultExceeded => "QUOTA_RESULT_EXCEEDED",
                    AdapterError::Upstream(_) => "ADAPTER_ERROR",
                };
                let mut builder = AuditEvent::builder(&audit_fields, tool.descriptor.required_action.as_str(), tool_name)
                    .outcome(Outcome::Denied, true, reason)
                    .duration_ms(elapsed_ms)
                    .adapter("postgres");
                if let Some(fp) = fingerprint {
                    builder = builder.query_fingerprint(fp);
                }
                self.audit_sink.emit(builder.build()).await?;
                Err(PipelineError::Adapter(err))
            }
        }
    }
}
