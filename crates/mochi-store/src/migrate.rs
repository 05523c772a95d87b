use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::Store;

/// Schema lifecycle for a single database file. `declared_schema` is the
/// version the *current* app code expects; `create`/`upgrade`/`downgrade`
/// are invoked by [`ensure_schema`] to walk a stored schema to that version.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    fn declared_schema(&self) -> i64;

    /// Runs once when `_settings` has no row yet. Must create `_settings`
    /// itself along with every other table this schema owns.
    async fn create(&self, store: &Store) -> Result<(), StoreError>;

    /// Runs once per intermediate version when the stored schema is behind
    /// `declared_schema`. `to` is the version being migrated *to*.
    async fn upgrade(&self, store: &Store, to: i64) -> Result<(), StoreError>;

    /// Runs once per intermediate version when the stored schema is ahead
    /// of `declared_schema` (an older binary opening a newer database).
    /// Default: refuse, since most schemas have no safe downgrade path.
    async fn downgrade(&self, _store: &Store, to: i64) -> Result<(), StoreError> {
        Err(StoreError::Migration(format!(
            "no downgrade path to schema {to}"
        )))
    }
}

const ENSURE_SETTINGS_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS _settings (schema INTEGER NOT NULL)";

/// Drives a store from whatever schema it holds (or none) to
/// `migrator.declared_schema()`, serialized per-file via the store's
/// migration lock so concurrent first-opens cannot double-run `create`.
pub async fn ensure_schema(
    store: &Store,
    migrator: &dyn SchemaMigrator,
) -> Result<(), StoreError> {
    let _guard = store.migration_guard().await;

    store.exec(ENSURE_SETTINGS_TABLE, &[]).await?;

    let stored: Option<i64> = store
        .integer("SELECT schema FROM _settings LIMIT 1", &[])
        .await
        .ok();

    let declared = migrator.declared_schema();

    match stored {
        None => {
            migrator.create(store).await?;
            store
                .exec("INSERT INTO _settings (schema) VALUES (?)", &[declared.into()])
                .await?;
        }
        Some(current) if current < declared => {
            for next in (current + 1)..=declared {
                migrator.upgrade(store, next).await?;
                store
                    .exec("UPDATE _settings SET schema = ?", &[next.into()])
                    .await?;
            }
        }
        Some(current) if current > declared => {
            let mut version = current;
            while version > declared {
                let next = version - 1;
                migrator.downgrade(store, next).await?;
                store
                    .exec("UPDATE _settings SET schema = ?", &[next.into()])
                    .await?;
                version = next;
            }
        }
        Some(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mochi_core::Value;

    struct ThreeStepMigrator;

    #[async_trait]
    impl SchemaMigrator for ThreeStepMigrator {
        fn declared_schema(&self) -> i64 {
            3
        }

        async fn create(&self, store: &Store) -> Result<(), StoreError> {
            store
                .exec("CREATE TABLE notes (id INTEGER PRIMARY KEY)", &[])
                .await?;
            Ok(())
        }

        async fn upgrade(&self, store: &Store, to: i64) -> Result<(), StoreError> {
            store
                .exec(
                    "INSERT INTO notes (id) VALUES (?)",
                    &[Value::Int(to)],
                )
                .await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_open_runs_create_then_sets_declared_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("m.db")).await.unwrap();
        let migrator = ThreeStepMigrator;

        ensure_schema(&store, &migrator).await.unwrap();

        let schema = store
            .integer("SELECT schema FROM _settings", &[])
            .await
            .unwrap();
        assert_eq!(schema, 3);
    }

    #[tokio::test]
    async fn reopen_at_same_schema_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("m.db")).await.unwrap();
        let migrator = ThreeStepMigrator;

        ensure_schema(&store, &migrator).await.unwrap();
        ensure_schema(&store, &migrator).await.unwrap();

        let count = store
            .integer("SELECT COUNT(*) FROM notes", &[])
            .await
            .unwrap();
        assert_eq!(count, 1, "create must not run twice");
    }
}
