// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concrete [`AuditSink`] implementations.
//!
//! Audit events are deliberately written through a raw, fallible I/O path
//! rather than through `tracing`: a `tracing` event has no failure channel
//! at all, so a dropped appender or a full pipe silently loses the record,
//! which is acceptable for operational logs (§4.9) but not for the
//! compliance trail. Writing directly to an `AsyncWrite` and surfacing its
//! `Err` is what lets the registry turn a write failure into `AUDIT_FAILURE`
//! and deny the request instead of proceeding unaudited.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::domain::audit::{AuditError, AuditEvent, AuditSink};

/// Serializes each event as one line of JSON and writes it to the wrapped
/// sink, flushing after every write so a caller awaiting `emit` knows the
/// record reached the OS before the pipeline proceeds.
pub struct JsonLinesAuditSink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W> JsonLinesAuditSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait::async_trait]
impl<W> AuditSink for JsonLinesAuditSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(&event).map_err(|e| AuditError(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| AuditError(e.to_string()))?;
        writer.flush().await.map_err(|e| AuditError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::Outcome;
    use crate::domain::session::{AuditFields, SessionId};
    use tokio::io::AsyncReadExt;

    fn fields() -> AuditFields {
        AuditFields {
            identity: "u@e".to_string(),
            tenant: "t1".to_string(),
            session_id: SessionId::new(),
            cap_set_id: None,
        }
    }

    #[tokio::test]
    async fn emits_one_json_line_per_event() {
        let (writer, mut reader) = tokio::io::duplex(4096);
        let sink = JsonLinesAuditSink::new(writer);
        let event = AuditEvent::builder(&fields(), "tool.invoke", "query_read")
            .outcome(Outcome::Allowed, true, "OK")
            .build();
        sink.emit(event).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = reader.read(&mut buf).await.unwrap();
        let text = String::from_utf8(buf[..n].to_vec()).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.contains("\"outcome\":\"ALLOWED\""));
    }
}
