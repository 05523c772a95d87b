use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use sqlx::sqlite::{SqliteColumn, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo};

use mochi_core::Value;

use crate::error::StoreError;

const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// A single open SQLite file, shared by every caller that resolves the same
/// path through the [`crate::manager::StoreManager`]. Close is deferred: the
/// manager's janitor evicts handles whose `closed_at` predates its sweep.
pub struct Store {
    path: PathBuf,
    pool: SqlitePool,
    closed_at: Mutex<Option<Instant>>,
    migration_lock: tokio::sync::Mutex<()>,
}

impl Store {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .connect_with(options)
            .await?;

        Ok(Store {
            path: path.to_path_buf(),
            pool,
            closed_at: Mutex::new(None),
            migration_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_closed(&self) {
        *self.closed_at.lock() = Some(Instant::now());
    }

    pub fn mark_reopened(&self) {
        *self.closed_at.lock() = None;
    }

    pub fn closed_for(&self) -> Option<std::time::Duration> {
        self.closed_at.lock().map(|at| at.elapsed())
    }

    /// Serializes schema migration against this file; multiple concurrent
    /// first-opens must not race each other through create/upgrade.
    pub async fn migration_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.migration_lock.lock().await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn exists(&self, sql: &str, args: &[Value]) -> Result<bool, StoreError> {
        let row = self.fetch_optional(sql, args).await?;
        Ok(row.is_some())
    }

    pub async fn row(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<BTreeMap<String, Value>>, StoreError> {
        match self.fetch_optional(sql, args).await? {
            Some(row) => Ok(Some(decode_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn rows(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<BTreeMap<String, Value>>, StoreError> {
        reject_attach_detach(sql)?;
        let query = bind_args(sqlx::query(sql), args)?;
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64, StoreError> {
        reject_attach_detach(sql)?;
        let query = bind_args(sqlx::query(sql), args)?;
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn integer(&self, sql: &str, args: &[Value]) -> Result<i64, StoreError> {
        let row = self
            .fetch_optional(sql, args)
            .await?
            .ok_or_else(|| StoreError::Argument("no row returned for integer()".into()))?;
        row.try_get::<i64, _>(0).map_err(StoreError::from)
    }

    /// Single-row positional scan: the Go-idiom `Scan(dest...)` adapted to a
    /// dynamic-value host as "give back the row as an ordered list instead
    /// of a name-keyed map" (spec.md §4.1's `scan(target, sql, args...) ->
    /// found`, reshaped since this runtime has no out-param/pointer concept
    /// to write `target` through — see DESIGN.md).
    pub async fn scan(&self, sql: &str, args: &[Value]) -> Result<Option<Vec<Value>>, StoreError> {
        match self.fetch_optional(sql, args).await? {
            Some(row) => Ok(Some(decode_row_positional(&row)?)),
            None => Ok(None),
        }
    }

    /// Multi-row positional scan, the `scans` counterpart of [`Store::scan`].
    pub async fn scans(&self, sql: &str, args: &[Value]) -> Result<Vec<Vec<Value>>, StoreError> {
        reject_attach_detach(sql)?;
        let query = bind_args(sqlx::query(sql), args)?;
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row_positional).collect()
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<SqliteRow>, StoreError> {
        reject_attach_detach(sql)?;
        let query = bind_args(sqlx::query(sql), args)?;
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

/// Refuses `ATTACH`/`DETACH` at the query-surface layer (spec.md §4.1):
/// `sqlx` exposes no custom-authorizer callback to deny these at the SQLite
/// connection level, so the normalized (trimmed, lowercased) leading keyword
/// is checked before any statement reaches the pool.
fn reject_attach_detach(sql: &str) -> Result<(), StoreError> {
    let normalized = sql.trim_start().to_ascii_lowercase();
    if normalized.starts_with("attach") || normalized.starts_with("detach") {
        return Err(StoreError::Argument(
            "ATTACH/DETACH statements are not permitted through the query surface".into(),
        ));
    }
    Ok(())
}

fn bind_args<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    args: &'q [Value],
) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>, StoreError> {
    for arg in args {
        query = match arg {
            Value::None => query.bind(None::<i64>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::String(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::List(_) | Value::Map(_) | Value::Stream(_) => {
                return Err(StoreError::Argument(
                    "list/map/stream values cannot be bound as query arguments".into(),
                ))
            }
        };
    }
    Ok(query)
}

/// Decodes one column by its declared SQLite type affinity. Blob columns
/// are decoded to UTF-8 strings when valid, otherwise kept as `Bytes`,
/// matching the "blob columns decoded to strings when round-tripped"
/// contract.
fn decode_column(row: &SqliteRow, column: &sqlx::sqlite::SqliteColumn) -> Result<Value, StoreError> {
    let type_name = column.type_info().name();
    Ok(match type_name {
        "INTEGER" | "BOOLEAN" => match row.try_get::<Option<i64>, _>(column.ordinal()) {
            Ok(Some(v)) => Value::Int(v),
            Ok(None) => Value::None,
            Err(_) => Value::None,
        },
        "REAL" => match row.try_get::<Option<f64>, _>(column.ordinal()) {
            Ok(Some(v)) => Value::Float(v),
            Ok(None) => Value::None,
            Err(_) => Value::None,
        },
        "TEXT" => match row.try_get::<Option<String>, _>(column.ordinal()) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::None,
            Err(_) => Value::None,
        },
        "BLOB" => match row.try_get::<Option<Vec<u8>>, _>(column.ordinal()) {
            Ok(Some(bytes)) => match String::from_utf8(bytes.clone()) {
                Ok(s) => Value::String(s),
                Err(_) => Value::Bytes(bytes),
            },
            Ok(None) => Value::None,
            Err(_) => Value::None,
        },
        "NULL" => Value::None,
        other => {
            return Err(StoreError::UnsupportedColumn(format!(
                "{} ({other})",
                column.name()
            )))
        }
    })
}

/// Decodes a row into a generic map, keyed by column name.
fn decode_row(row: &SqliteRow) -> Result<BTreeMap<String, Value>, StoreError> {
    let mut out = BTreeMap::new();
    for column in row.columns() {
        out.insert(column.name().to_string(), decode_column(row, column)?);
    }
    Ok(out)
}

/// Decodes a row into an ordered list, one entry per column in declared
/// (not alphabetical) order — the positional counterpart of [`decode_row`]
/// used by [`Store::scan`]/[`Store::scans`].
fn decode_row_positional(row: &SqliteRow) -> Result<Vec<Value>, StoreError> {
    row.columns().iter().map(|column| decode_column(row, column)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_then_row_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).await.unwrap();
        store
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        store
            .exec(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[Value::Int(1), Value::String("hi".into())],
            )
            .await
            .unwrap();

        let row = store
            .row("SELECT id, name FROM t WHERE id = ?", &[Value::Int(1)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name"), Some(&Value::String("hi".into())));
    }

    #[tokio::test]
    async fn exists_is_false_for_missing_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).await.unwrap();
        store
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        let found = store
            .exists("SELECT 1 FROM t WHERE id = ?", &[Value::Int(9)])
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn rejects_list_argument() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).await.unwrap();
        let err = store
            .exec("SELECT 1", &[Value::List(vec![])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Argument(_)));
    }
}
