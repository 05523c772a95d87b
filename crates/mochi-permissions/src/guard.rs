use std::sync::Arc;

use mochi_core::{UserRole, Value};
use mochi_store::Store;
use tracing::debug;

use crate::def::{url_host_matches, PermissionDef, URL_PERMISSION_PREFIX};
use crate::error::PermissionError;

const ENSURE_TABLE: &str = "CREATE TABLE IF NOT EXISTS _permissions (
    app_id TEXT NOT NULL,
    name TEXT NOT NULL,
    object TEXT NOT NULL DEFAULT '',
    granted INTEGER NOT NULL,
    PRIMARY KEY (app_id, name, object)
)";

/// Per-user permission grants, backed by a `_permissions` table in the
/// relevant per-app (or host-wide) database. Internal apps never construct
/// one of these on their own dispatch path — the registry bypasses the
/// guard entirely for `AppKind::Internal`, per spec §4.5.
pub struct PermissionGuard {
    store: Arc<Store>,
}

impl PermissionGuard {
    pub fn new(store: Arc<Store>) -> Self {
        PermissionGuard { store }
    }

    async fn ensure_table(&self) -> Result<(), PermissionError> {
        self.store.exec(ENSURE_TABLE, &[]).await?;
        Ok(())
    }

    /// Lazily seeds an app's declared default grants the first time a user
    /// uses it. `insert-or-ignore` semantics mean user revocations survive
    /// re-runs; returns how many defaults were newly applied so repeat
    /// calls after a server update can report only the delta.
    pub async fn seed_defaults(
        &self,
        app_id: &str,
        defaults: &[PermissionDef],
    ) -> Result<usize, PermissionError> {
        self.ensure_table().await?;
        let mut applied = 0;
        for def in defaults {
            let affected = self
                .store
                .exec(
                    "INSERT OR IGNORE INTO _permissions (app_id, name, object, granted)
                     VALUES (?, ?, '', 1)",
                    &[Value::String(app_id.to_string()), Value::String(def.name.clone())],
                )
                .await?;
            if affected > 0 {
                applied += 1;
            }
        }
        debug!(app_id, applied, "seeded default permission grants");
        Ok(applied)
    }

    /// Checks `(user_role, app_id, name, object)` per spec §4.5: internal
    /// apps bypass entirely (callers should not reach this for internal
    /// apps, but it is still honored defensively), admin-only permissions
    /// deny non-administrators outright, `url:` permissions use
    /// wildcard/subdomain matching, everything else requires an exact
    /// `(name, object)` grant row.
    pub async fn check(
        &self,
        is_internal: bool,
        role: UserRole,
        app_id: &str,
        name: &str,
        object: &str,
        defs: &[PermissionDef],
    ) -> Result<(), PermissionError> {
        if is_internal {
            return Ok(());
        }

        let def = defs.iter().find(|d| d.name == name);
        if let Some(def) = def {
            if def.admin_only && role != UserRole::Administrator {
                return Err(PermissionError::Denied {
                    permission: name.to_string(),
                    restricted: def.restricted,
                });
            }
        }

        self.ensure_table().await?;

        if let Some(host) = name.strip_prefix(URL_PERMISSION_PREFIX) {
            return self.check_url(app_id, host, object, def).await;
        }

        let granted = self
            .store
            .exists(
                "SELECT 1 FROM _permissions WHERE app_id = ? AND name = ? AND object = ? AND granted = 1",
                &[
                    Value::String(app_id.to_string()),
                    Value::String(name.to_string()),
                    Value::String(object.to_string()),
                ],
            )
            .await?;

        if granted {
            Ok(())
        } else {
            Err(PermissionError::Denied {
                permission: name.to_string(),
                restricted: def.map(|d| d.restricted).unwrap_or(true),
            })
        }
    }

    async fn check_url(
        &self,
        app_id: &str,
        host: &str,
        _object: &str,
        def: Option<&PermissionDef>,
    ) -> Result<(), PermissionError> {
        let rows = self
            .store
            .rows(
                "SELECT object FROM _permissions
                 WHERE app_id = ? AND name LIKE 'url:%' AND granted = 1",
                &[Value::String(app_id.to_string())],
            )
            .await?;

        let matches = rows.iter().any(|row| {
            row.get("object")
                .and_then(Value::as_str)
                .map(|granted| url_host_matches(granted, host))
                .unwrap_or(false)
        });

        if matches {
            Ok(())
        } else {
            Err(PermissionError::Denied {
                permission: format!("url:{host}"),
                restricted: def.map(|d| d.restricted).unwrap_or(false),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_core::Value;

    async fn fixture() -> PermissionGuard {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("app.db")).await.unwrap());
        PermissionGuard::new(store)
    }

    #[tokio::test]
    async fn admin_only_permission_denies_regular_user() {
        let guard = fixture().await;
        let defs = vec![PermissionDef {
            name: "settings:write".into(),
            restricted: true,
            admin_only: true,
        }];
        let err = guard
            .check(false, UserRole::User, "notes", "settings:write", "", &defs)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Denied { restricted: true, .. }));
    }

    #[tokio::test]
    async fn internal_apps_bypass_checks() {
        let guard = fixture().await;
        guard
            .check(true, UserRole::User, "notes", "anything", "", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn grant_permits_exact_name_object_match() {
        let guard = fixture().await;
        guard.ensure_table().await.unwrap();
        guard
            .store
            .exec(
                "INSERT INTO _permissions (app_id, name, object, granted) VALUES (?, ?, '', 1)",
                &[Value::String("notes".into()), Value::String("file:read".into())],
            )
            .await
            .unwrap();

        guard
            .check(false, UserRole::User, "notes", "file:read", "", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn url_permission_uses_subdomain_matching() {
        let guard = fixture().await;
        guard.ensure_table().await.unwrap();
        guard
            .store
            .exec(
                "INSERT INTO _permissions (app_id, name, object, granted) VALUES (?, 'url:github.com', ?, 1)",
                &[Value::String("notes".into()), Value::String("github.com".into())],
            )
            .await
            .unwrap();

        guard
            .check(false, UserRole::User, "notes", "url:api.github.com", "api.github.com", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn seed_defaults_is_idempotent_after_revocation() {
        let guard = fixture().await;
        let defs = vec![PermissionDef {
            name: "file:read".into(),
            restricted: false,
            admin_only: false,
        }];
        let applied_first = guard.seed_defaults("notes", &defs).await.unwrap();
        assert_eq!(applied_first, 1);

        guard
            .store
            .exec(
                "UPDATE _permissions SET granted = 0 WHERE app_id = ? AND name = ?",
                &[Value::String("notes".into()), Value::String("file:read".into())],
            )
            .await
            .unwrap();

        let applied_second = guard.seed_defaults("notes", &defs).await.unwrap();
        assert_eq!(applied_second, 0, "insert-or-ignore must not clobber a revoked grant");

        let err = guard
            .check(false, UserRole::User, "notes", "file:read", "", &defs)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Denied { .. }));
    }
}
