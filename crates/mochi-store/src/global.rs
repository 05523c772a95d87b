//! Schema migrators for the six process-wide databases enumerated in the
//! core's external-interface layout (`<data>/db/*.db`). Each is a thin
//! [`SchemaMigrator`] impl; no upgrade functions exist yet because these are
//! the schemas' first declared version.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::migrate::SchemaMigrator;
use crate::store::Store;

pub struct UsersSchema;

#[async_trait]
impl SchemaMigrator for UsersSchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL,
                    timezone TEXT NOT NULL DEFAULT 'UTC',
                    language TEXT NOT NULL DEFAULT 'en'
                )",
                &[],
            )
            .await?;
        store
            .exec(
                "CREATE TABLE logins (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        store
            .exec(
                "CREATE TABLE one_time_codes (
                    code TEXT PRIMARY KEY,
                    user INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    purpose TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

pub struct DirectorySchema;

#[async_trait]
impl SchemaMigrator for DirectorySchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE entities (
                    id TEXT PRIMARY KEY,
                    fingerprint TEXT NOT NULL,
                    owner_user INTEGER NOT NULL,
                    class TEXT NOT NULL,
                    name TEXT NOT NULL,
                    privacy TEXT NOT NULL,
                    public_material BLOB NOT NULL,
                    published INTEGER NOT NULL DEFAULT 0
                )",
                &[],
            )
            .await?;
        store
            .exec(
                "CREATE INDEX entities_fingerprint ON entities(fingerprint)",
                &[],
            )
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

pub struct PeersSchema;

#[async_trait]
impl SchemaMigrator for PeersSchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE peers (
                    entity TEXT PRIMARY KEY,
                    address TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

pub struct QueueSchema;

#[async_trait]
impl SchemaMigrator for QueueSchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE queue (
                    id TEXT PRIMARY KEY,
                    message_type TEXT NOT NULL,
                    target_peer TEXT,
                    from_entity TEXT NOT NULL,
                    to_entity TEXT NOT NULL,
                    service TEXT NOT NULL,
                    event TEXT NOT NULL,
                    content BLOB NOT NULL,
                    data_blob BLOB,
                    file TEXT,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    next_retry TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    last_error TEXT,
                    expires TEXT NOT NULL,
                    created TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        store
            .exec(
                "CREATE INDEX queue_pending_order ON queue(status, next_retry)",
                &[],
            )
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

pub struct ScheduleSchema;

#[async_trait]
impl SchemaMigrator for ScheduleSchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE schedule (
                    id TEXT PRIMARY KEY,
                    user INTEGER NOT NULL,
                    app TEXT NOT NULL,
                    due INTEGER NOT NULL,
                    event TEXT NOT NULL,
                    data BLOB,
                    interval INTEGER NOT NULL DEFAULT 0,
                    created TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        store
            .exec("CREATE INDEX schedule_due ON schedule(due)", &[])
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

pub struct SettingsSchema;

#[async_trait]
impl SchemaMigrator for SettingsSchema {
    fn declared_schema(&self) -> i64 {
        1
    }

    async fn create(&self, store: &Store) -> Result<(), StoreError> {
        store
            .exec(
                "CREATE TABLE settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                &[],
            )
            .await?;
        Ok(())
    }

    async fn upgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!("no upgrade path to schema {to}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::ensure_schema;

    #[tokio::test]
    async fn users_schema_creates_expected_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("users.db")).await.unwrap();
        ensure_schema(&store, &UsersSchema).await.unwrap();

        assert!(store
            .exists(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='users'",
                &[]
            )
            .await
            .unwrap());
        assert!(store
            .exists(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='logins'",
                &[]
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn queue_schema_creates_pending_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("queue.db")).await.unwrap();
        ensure_schema(&store, &QueueSchema).await.unwrap();

        assert!(store
            .exists(
                "SELECT 1 FROM sqlite_master WHERE type='index' AND name='queue_pending_order'",
                &[]
            )
            .await
            .unwrap());
    }
}
