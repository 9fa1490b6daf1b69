// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concrete [`Adapter`] backed by `sqlx`'s Postgres driver. The only
//! component in the workspace that actually reaches the network.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, PgPool, Row};

use crate::domain::adapter::{Adapter, AdapterError, QueryRequest, QueryResponse};
use crate::domain::session::SessionRegistry;

pub struct PostgresAdapter {
    pool: PgPool,
    registry: Arc<SessionRegistry>,
}

impl PostgresAdapter {
    pub async fn connect(database_url: &str, registry: Arc<SessionRegistry>) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool, registry })
    }
}

#[async_trait::async_trait]
impl Adapter for PostgresAdapter {
    async fn execute(&self, request: QueryRequest) -> Result<QueryResponse, AdapterError> {
        if !self.registry.verify(&request.session) {
            return Err(AdapterError::SessionNotVerified);
        }

        let query = sqlx::query(&request.sql);

        let rows = tokio::time::timeout(request.max_duration, query.fetch_all(&self.pool))
            .await
            .map_err(|_| AdapterError::DeadlineExceeded)?
            .map_err(|e| AdapterError::Upstream(e.to_string()))?;

        let mut values = Vec::with_capacity(rows.len());
        let mut byte_size: u64 = 0;
        for row in rows {
            let value = row_to_json(&row);
            byte_size += serde_json::to_vec(&value).map(|v| v.len() as u64).unwrap_or(0);
            if byte_size > request.max_result_bytes {
                return Err(AdapterError::ResultExceeded);
            }
            values.push(value);
        }

        Ok(QueryResponse {
            rows: values,
            byte_size,
        })
    }
}

/// Postgres driver values are converted to the nearest `serde_json::Value`
/// shape. Unrecognized column types fall back to their textual
/// representation rather than failing the whole row.
fn row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = row
            .try_get::<serde_json::Value, _>(i)
            .or_else(|_| row.try_get::<String, _>(i).map(serde_json::Value::String))
            .or_else(|_| row.try_get::<i64, _>(i).map(|n| serde_json::Value::Number(n.into())))
            .unwrap_or(serde_json::Value::Null);
        object.insert(column.name().to_string(), value);
    }
    serde_json::Value::Object(object)
}
