use std::sync::Arc;

use chrono::Utc;
use mochi_core::{ScheduledEvent, Value};
use mochi_store::Store;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Operations against the persistent `schedule` table (spec §4.3), layered
/// over the generic [`Store`] query surface.
pub struct ScheduleStore {
    store: Arc<Store>,
}

impl ScheduleStore {
    pub fn new(store: Arc<Store>) -> Self {
        ScheduleStore { store }
    }

    pub async fn create(
        &self,
        user: i64,
        app: &str,
        due: i64,
        event: &str,
        data_blob: Option<Vec<u8>>,
        interval_seconds: i64,
    ) -> Result<Uuid, SchedulerError> {
        let id = Uuid::new_v4();
        self.store
            .exec(
                "INSERT INTO schedule (id, user, app, due, event, data, interval, created)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    Value::String(id.to_string()),
                    Value::Int(user),
                    Value::String(app.to_string()),
                    Value::Int(due),
                    Value::String(event.to_string()),
                    data_blob.map(Value::Bytes).unwrap_or(Value::None),
                    Value::Int(interval_seconds),
                    Value::String(Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ScheduledEvent>, SchedulerError> {
        let row = self
            .store
            .row(
                "SELECT id, user, app, due, event, data, interval, created FROM schedule WHERE id = ?",
                &[Value::String(id.to_string())],
            )
            .await?;
        Ok(row.map(|r| row_to_event(&r)))
    }

    pub async fn list(&self, app: &str, user: i64) -> Result<Vec<ScheduledEvent>, SchedulerError> {
        let rows = self
            .store
            .rows(
                "SELECT id, user, app, due, event, data, interval, created
                 FROM schedule WHERE app = ? AND user = ? ORDER BY due ASC",
                &[Value::String(app.to_string()), Value::Int(user)],
            )
            .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.store
            .exec(
                "DELETE FROM schedule WHERE id = ?",
                &[Value::String(id.to_string())],
            )
            .await?;
        Ok(())
    }

    pub async fn due(&self, now: i64) -> Result<Vec<ScheduledEvent>, SchedulerError> {
        let rows = self
            .store
            .rows(
                "SELECT id, user, app, due, event, data, interval, created
                 FROM schedule WHERE due <= ? ORDER BY due ASC",
                &[Value::Int(now)],
            )
            .await?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    pub async fn next(&self) -> Result<Option<ScheduledEvent>, SchedulerError> {
        let row = self
            .store
            .row(
                "SELECT id, user, app, due, event, data, interval, created
                 FROM schedule ORDER BY due ASC LIMIT 1",
                &[],
            )
            .await?;
        Ok(row.map(|r| row_to_event(&r)))
    }

    /// Atomically claims a due event: reschedules it (`due += interval`) if
    /// recurring, or deletes it if one-shot. The `WHERE due = ?` guard means
    /// only one concurrent dispatcher wins the race; the other's update
    /// affects zero rows.
    pub async fn claim(&self, event: &ScheduledEvent) -> Result<bool, SchedulerError> {
        let affected = if event.is_recurring() {
            self.store
                .exec(
                    "UPDATE schedule SET due = ? WHERE id = ? AND due = ?",
                    &[
                        Value::Int(event.due_unix + event.interval_seconds),
                        Value::String(event.id.to_string()),
                        Value::Int(event.due_unix),
                    ],
                )
                .await?
        } else {
            self.store
                .exec(
                    "DELETE FROM schedule WHERE id = ? AND due = ?",
                    &[
                        Value::String(event.id.to_string()),
                        Value::Int(event.due_unix),
                    ],
                )
                .await?
        };
        Ok(affected > 0)
    }
}

fn row_to_event(row: &std::collections::BTreeMap<String, Value>) -> ScheduledEvent {
    let id = row
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::nil);
    let data_blob = match row.get("data") {
        Some(Value::Bytes(b)) => Some(b.clone()),
        Some(Value::String(s)) => Some(s.as_bytes().to_vec()),
        _ => None,
    };
    let created = row
        .get("created")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    ScheduledEvent {
        id,
        user: row.get("user").and_then(Value::as_int).unwrap_or(0),
        app: row
            .get("app")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        due_unix: row.get("due").and_then(Value::as_int).unwrap_or(0),
        event_name: row
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        data_blob,
        interval_seconds: row.get("interval").and_then(Value::as_int).unwrap_or(0),
        created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_store::{ensure_schema, ScheduleSchema};

    async fn fixture() -> ScheduleStore {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("schedule.db")).await.unwrap());
        ensure_schema(&store, &ScheduleSchema).await.unwrap();
        ScheduleStore::new(store)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let schedule = fixture().await;
        let id = schedule
            .create(1, "auctions", 100, "tick", None, 300)
            .await
            .unwrap();
        let event = schedule.get(id).await.unwrap().unwrap();
        assert_eq!(event.due_unix, 100);
        assert_eq!(event.interval_seconds, 300);
        assert!(event.is_recurring());
    }

    #[tokio::test]
    async fn claim_on_recurring_reschedules_instead_of_deleting() {
        let schedule = fixture().await;
        let id = schedule
            .create(1, "auctions", 100, "tick", None, 300)
            .await
            .unwrap();
        let event = schedule.get(id).await.unwrap().unwrap();

        assert!(schedule.claim(&event).await.unwrap());
        let after = schedule.get(id).await.unwrap().unwrap();
        assert_eq!(after.due_unix, 400);
    }

    #[tokio::test]
    async fn claim_on_one_shot_deletes_row() {
        let schedule = fixture().await;
        let id = schedule.create(1, "auctions", 100, "tick", None, 0).await.unwrap();
        let event = schedule.get(id).await.unwrap().unwrap();

        assert!(schedule.claim(&event).await.unwrap());
        assert!(schedule.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_claim_on_stale_due_loses_the_race() {
        let schedule = fixture().await;
        let id = schedule.create(1, "auctions", 100, "tick", None, 300).await.unwrap();
        let event = schedule.get(id).await.unwrap().unwrap();

        assert!(schedule.claim(&event).await.unwrap());
        // second dispatcher holding the stale `due_unix=100` view loses.
        assert!(!schedule.claim(&event).await.unwrap());
    }
}
