use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mochi_core::{EntityId, Message, MessageStatus, MessageType, Value};
use mochi_store::Store;
use uuid::Uuid;

use crate::error::QueueError;

/// Operations against the persistent `queue` table (spec §4.8).
pub struct QueueStore {
    store: Arc<Store>,
}

impl QueueStore {
    pub fn new(store: Arc<Store>) -> Self {
        QueueStore { store }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        message_type: MessageType,
        target_peer: Option<&str>,
        from_entity: EntityId,
        to_entity: EntityId,
        service: &str,
        event: &str,
        content: &Value,
        data_blob: Option<Vec<u8>>,
        file: Option<&str>,
        expires: DateTime<Utc>,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let content_bytes =
            serde_json::to_vec(&content.to_json()).map_err(|e| QueueError::Argument(e.to_string()))?;

        self.store
            .exec(
                "INSERT INTO queue (
                    id, message_type, target_peer, from_entity, to_entity, service, event,
                    content, data_blob, file, attempts, next_retry, status, last_error, expires, created
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 'pending', NULL, ?, ?)",
                &[
                    Value::String(id.to_string()),
                    Value::String(message_type_str(message_type).into()),
                    target_peer.map(|p| Value::String(p.to_string())).unwrap_or(Value::None),
                    Value::String(from_entity.to_hex()),
                    Value::String(to_entity.to_hex()),
                    Value::String(service.to_string()),
                    Value::String(event.to_string()),
                    Value::Bytes(content_bytes),
                    data_blob.map(Value::Bytes).unwrap_or(Value::None),
                    file.map(|f| Value::String(f.to_string())).unwrap_or(Value::None),
                    Value::String(now.to_rfc3339()),
                    Value::String(expires.to_rfc3339()),
                    Value::String(now.to_rfc3339()),
                ],
            )
            .await?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Message>, QueueError> {
        let row = self
            .store
            .row(&format!("{SELECT_COLUMNS} WHERE id = ?"), &[Value::String(id.to_string())])
            .await?;
        row.as_ref().map(row_to_message).transpose()
    }

    /// Rows ready for delivery right now, oldest `next_retry` first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Message>, QueueError> {
        let rows = self
            .store
            .rows(
                &format!("{SELECT_COLUMNS} WHERE status = 'pending' AND next_retry <= ? ORDER BY next_retry ASC"),
                &[Value::String(now.to_rfc3339())],
            )
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    pub async fn ack(&self, id: Uuid) -> Result<(), QueueError> {
        self.store
            .exec("DELETE FROM queue WHERE id = ?", &[Value::String(id.to_string())])
            .await?;
        Ok(())
    }

    /// Increments `attempts` and schedules the next retry, or moves the row
    /// to `dead` if attempts are exhausted or `expires` has passed.
    pub async fn fail(&self, id: Uuid, reason: &str, max_attempts: u32) -> Result<(), QueueError> {
        let Some(message) = self.get(id).await? else {
            return Err(QueueError::NotFound);
        };

        let attempts = message.attempts + 1;
        let now = Utc::now();
        if attempts >= max_attempts || message.expires <= now {
            self.store
                .exec(
                    "UPDATE queue SET attempts = ?, status = 'dead', last_error = ? WHERE id = ?",
                    &[
                        Value::Int(attempts as i64),
                        Value::String(reason.to_string()),
                        Value::String(id.to_string()),
                    ],
                )
                .await?;
            return Ok(());
        }

        let next_retry = now + chrono::Duration::seconds(backoff_seconds(attempts) as i64);
        self.store
            .exec(
                "UPDATE queue SET attempts = ?, next_retry = ?, last_error = ? WHERE id = ?",
                &[
                    Value::Int(attempts as i64),
                    Value::String(next_retry.to_rfc3339()),
                    Value::String(reason.to_string()),
                    Value::String(id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_dead(&self) -> Result<Vec<Message>, QueueError> {
        let rows = self
            .store
            .rows(&format!("{SELECT_COLUMNS} WHERE status = 'dead' ORDER BY created ASC"), &[])
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Operator helper: resets a dead row back to pending with a fresh
    /// retry clock, per spec.md §4-supplement dead-letter inspection.
    pub async fn requeue(&self, id: Uuid) -> Result<(), QueueError> {
        let affected = self
            .store
            .exec(
                "UPDATE queue SET status = 'pending', attempts = 0, next_retry = ?, last_error = NULL
                 WHERE id = ? AND status = 'dead'",
                &[Value::String(Utc::now().to_rfc3339()), Value::String(id.to_string())],
            )
            .await?;
        if affected == 0 {
            return Err(QueueError::NotFound);
        }
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, message_type, target_peer, from_entity, to_entity, service, event, \
     content, data_blob, file, attempts, next_retry, status, last_error, expires, created FROM queue";

/// Base backoff per spec.md §4.8: exponential with full jitter, base 5s,
/// cap 1h.
fn backoff_seconds(attempts: u32) -> u64 {
    use rand::Rng;
    let base: u64 = 5;
    let cap: u64 = 3600;
    let exp = base.saturating_mul(1u64 << attempts.min(16));
    let bound = exp.min(cap);
    rand::thread_rng().gen_range(0..=bound.max(1))
}

fn message_type_str(t: MessageType) -> &'static str {
    match t {
        MessageType::Direct => "direct",
        MessageType::Broadcast => "broadcast",
    }
}

fn parse_message_type(s: &str) -> MessageType {
    match s {
        "broadcast" => MessageType::Broadcast,
        _ => MessageType::Direct,
    }
}

fn parse_status(s: &str) -> MessageStatus {
    match s {
        "sent" => MessageStatus::Sent,
        "failed" => MessageStatus::Failed,
        "dead" => MessageStatus::Dead,
        _ => MessageStatus::Pending,
    }
}

fn parse_entity(hex: &str) -> EntityId {
    let mut bytes = [0u8; 32];
    for (i, b) in bytes.iter_mut().enumerate() {
        if let Some(byte) = hex.get(i * 2..i * 2 + 2).and_then(|s| u8::from_str_radix(s, 16).ok()) {
            *b = byte;
        }
    }
    EntityId(bytes)
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_message(row: &BTreeMap<String, Value>) -> Result<Message, QueueError> {
    let id = row
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| QueueError::Argument("queue row missing id".into()))?;

    let content_bytes = match row.get("content") {
        Some(Value::Bytes(b)) => b.clone(),
        Some(Value::String(s)) => s.as_bytes().to_vec(),
        _ => Vec::new(),
    };
    let content_json: serde_json::Value =
        serde_json::from_slice(&content_bytes).unwrap_or(serde_json::Value::Null);
    let content = Value::from_json(&content_json);

    let data_blob = match row.get("data_blob") {
        Some(Value::Bytes(b)) => Some(b.clone()),
        _ => None,
    };

    Ok(Message {
        id,
        message_type: parse_message_type(row.get("message_type").and_then(Value::as_str).unwrap_or("direct")),
        target_peer: row.get("target_peer").and_then(Value::as_str).map(str::to_string),
        from_entity: parse_entity(row.get("from_entity").and_then(Value::as_str).unwrap_or_default()),
        to_entity: parse_entity(row.get("to_entity").and_then(Value::as_str).unwrap_or_default()),
        service: row.get("service").and_then(Value::as_str).unwrap_or_default().to_string(),
        event: row.get("event").and_then(Value::as_str).unwrap_or_default().to_string(),
        content,
        data_blob,
        file: row.get("file").and_then(Value::as_str).map(str::to_string),
        attempts: row.get("attempts").and_then(Value::as_int).unwrap_or(0) as u32,
        next_retry: row
            .get("next_retry")
            .and_then(Value::as_str)
            .map(parse_rfc3339)
            .unwrap_or_else(Utc::now),
        status: parse_status(row.get("status").and_then(Value::as_str).unwrap_or("pending")),
        last_error: row.get("last_error").and_then(Value::as_str).map(str::to_string),
        expires: row
            .get("expires")
            .and_then(Value::as_str)
            .map(parse_rfc3339)
            .unwrap_or_else(Utc::now),
        created: row
            .get("created")
            .and_then(Value::as_str)
            .map(parse_rfc3339)
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_store::{ensure_schema, QueueSchema};

    async fn fixture() -> QueueStore {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("queue.db")).await.unwrap());
        ensure_schema(&store, &QueueSchema).await.unwrap();
        QueueStore::new(store)
    }

    fn entity(byte: u8) -> EntityId {
        EntityId([byte; 32])
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips() {
        let queue = fixture().await;
        let id = queue
            .enqueue(
                MessageType::Direct,
                None,
                entity(1),
                entity(2),
                "feeds",
                "post/create",
                &Value::String("hi".into()),
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        let message = queue.get(id).await.unwrap().unwrap();
        assert_eq!(message.service, "feeds");
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.content, Value::String("hi".into()));
    }

    #[tokio::test]
    async fn ack_deletes_the_row() {
        let queue = fixture().await;
        let id = queue
            .enqueue(
                MessageType::Direct,
                None,
                entity(1),
                entity(2),
                "feeds",
                "post/create",
                &Value::None,
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        queue.ack(id).await.unwrap();
        assert!(queue.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_reschedules_until_attempts_exhausted_then_goes_dead() {
        let queue = fixture().await;
        let id = queue
            .enqueue(
                MessageType::Direct,
                None,
                entity(1),
                entity(2),
                "feeds",
                "post/create",
                &Value::None,
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        queue.fail(id, "peer unreachable", 3).await.unwrap();
        let after_first = queue.get(id).await.unwrap().unwrap();
        assert_eq!(after_first.attempts, 1);
        assert_eq!(after_first.status, MessageStatus::Pending);

        queue.fail(id, "peer unreachable", 3).await.unwrap();
        queue.fail(id, "peer unreachable", 3).await.unwrap();
        let after_third = queue.get(id).await.unwrap().unwrap();
        assert_eq!(after_third.attempts, 3);
        assert_eq!(after_third.status, MessageStatus::Dead);
    }

    #[tokio::test]
    async fn requeue_resets_a_dead_row_to_pending() {
        let queue = fixture().await;
        let id = queue
            .enqueue(
                MessageType::Direct,
                None,
                entity(1),
                entity(2),
                "feeds",
                "post/create",
                &Value::None,
                None,
                None,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        queue.fail(id, "gone", 1).await.unwrap();
        assert_eq!(queue.list_dead().await.unwrap().len(), 1);

        queue.requeue(id).await.unwrap();
        let after = queue.get(id).await.unwrap().unwrap();
        assert_eq!(after.status, MessageStatus::Pending);
        assert_eq!(after.attempts, 0);
    }
}
