use mochi_core::Value as HostValue;

use crate::error::RuntimeError;
use crate::host::context::HostContext;

/// `db.exists/row/query(sql, params...)` against the calling app's own
/// database (spec §4.4). No permission gate: an app's own database is
/// always available to itself.
pub async fn exists(ctx: &HostContext, sql: &str, params: Vec<HostValue>) -> Result<bool, RuntimeError> {
    ctx.db.exists(sql, &params).await.map_err(|e| RuntimeError::Database(e.to_string()))
}

pub async fn row(
    ctx: &HostContext,
    sql: &str,
    params: Vec<HostValue>,
) -> Result<Option<HostValue>, RuntimeError> {
    let row = ctx
        .db
        .row(sql, &params)
        .await
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
    Ok(row.map(HostValue::Map))
}

pub async fn query(
    ctx: &HostContext,
    sql: &str,
    params: Vec<HostValue>,
) -> Result<HostValue, RuntimeError> {
    let rows = ctx
        .db
        .rows(sql, &params)
        .await
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
    Ok(HostValue::List(rows.into_iter().map(HostValue::Map).collect()))
}

/// Positional single-row scan (spec §4.1's `scan`): column values in
/// declared order rather than `row`'s name-keyed map.
pub async fn scan(
    ctx: &HostContext,
    sql: &str,
    params: Vec<HostValue>,
) -> Result<Option<HostValue>, RuntimeError> {
    let values = ctx
        .db
        .scan(sql, &params)
        .await
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
    Ok(values.map(HostValue::List))
}

/// Positional multi-row scan (spec §4.1's `scans`), the `scan` counterpart
/// of `query`.
pub async fn scans(
    ctx: &HostContext,
    sql: &str,
    params: Vec<HostValue>,
) -> Result<HostValue, RuntimeError> {
    let rows = ctx
        .db
        .scans(sql, &params)
        .await
        .map_err(|e| RuntimeError::Database(e.to_string()))?;
    Ok(HostValue::List(rows.into_iter().map(HostValue::List).collect()))
}
