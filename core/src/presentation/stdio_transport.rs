// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Line-delimited JSON loop over stdio. Stands in for the production
//! JSON-RPC transport; carries no enforcement logic of its own; exists only
//! to give [`ToolRegistry`] a runnable entrypoint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::application::registry::ToolRegistry;
use crate::domain::session::SessionContext;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: &'static str,
    message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

pub struct StdioTransport {
    registry: Arc<ToolRegistry>,
    ctx: Arc<SessionContext>,
}

impl StdioTransport {
    pub fn new(registry: Arc<ToolRegistry>, ctx: Arc<SessionContext>) -> Self {
        Self { registry, ctx }
    }

    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let mut bytes = serde_json::to_vec(&response).expect("RpcResponse always serializes");
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => return RpcResponse::err(Value::Null, "INVALID_REQUEST", e.to_string()),
        };

        match request.method.as_str() {
            "tools/list" => {
                let tools = self.registry.list_tools(&self.ctx);
                RpcResponse::ok(request.id, serde_json::json!({ "tools": tools }))
            }
            "tools/call" => self.handle_tools_call(request).await,
            other => RpcResponse::err(request.id, "UNKNOWN_METHOD", format!("no such method: {other}")),
        }
    }

    async fn handle_tools_call(&self, request: RpcRequest) -> RpcResponse {
        // `identity`, `tenant`, and `capabilities` in params, if present, are
        // read by nothing below — the bound session and its attached
        // capabilities are the only source of truth for either.
        let name = match request.params.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => return RpcResponse::err(request.id, "INVALID_REQUEST", "missing params.name"),
        };
        let arguments = request
            .params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        match self.registry.execute_tool(&self.ctx, &name, &arguments).await {
            Ok(response) => RpcResponse::ok(
                request.id,
                serde_json::json!({ "rows": response.rows, "byteSize": response.byte_size }),
            ),
            Err(err) => RpcResponse::err(request.id, err.code(), err.to_string()),
        }
    }
}
