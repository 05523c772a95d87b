use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mochi_core::{EntityId, Value};
use mochi_store::Store;
use mochi_wire::DirectoryLookup;

/// Reads the `entities` table in `directory.db` (spec §4.2's "every entity
/// is owned by exactly one user"): entity id -> (owning user, public
/// signing material). Used both to verify inbound peer signatures
/// ([`DirectoryLookup`]) and to resolve which local user an inbound
/// message's `to` entity belongs to, so the accept loop knows whose
/// `Event` to dispatch.
pub struct EntityDirectory {
    store: Arc<Store>,
}

impl EntityDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        EntityDirectory { store }
    }

    pub async fn owner_of(&self, entity: EntityId) -> Result<Option<i64>> {
        let row = self
            .store
            .row(
                "SELECT owner_user FROM entities WHERE id = ?",
                &[Value::String(entity.to_hex())],
            )
            .await
            .context("failed to resolve entity owner")?;
        Ok(row.and_then(|r| r.get("owner_user").and_then(Value::as_int)))
    }
}

#[async_trait]
impl DirectoryLookup for EntityDirectory {
    async fn public_material_of(&self, entity: &EntityId) -> Option<[u8; 32]> {
        let row = self
            .store
            .row(
                "SELECT public_material FROM entities WHERE id = ?",
                &[Value::String(entity.to_hex())],
            )
            .await
            .ok()??;
        let bytes = match row.get("public_material") {
            Some(Value::Bytes(b)) => b.clone(),
            Some(Value::String(s)) => s.as_bytes().to_vec(),
            _ => return None,
        };
        <[u8; 32]>::try_from(bytes.as_slice()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_store::{ensure_schema, DirectorySchema};

    async fn fixture() -> EntityDirectory {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("directory.db")).await.unwrap());
        ensure_schema(&store, &DirectorySchema).await.unwrap();
        EntityDirectory::new(store)
    }

    #[tokio::test]
    async fn unknown_entity_has_no_owner_or_material() {
        let directory = fixture().await;
        let entity = EntityId([1u8; 32]);
        assert_eq!(directory.owner_of(entity).await.unwrap(), None);
        assert_eq!(directory.public_material_of(&entity).await, None);
    }

    #[tokio::test]
    async fn owner_and_public_material_resolve_after_insert() {
        let directory = fixture().await;
        let entity = EntityId([2u8; 32]);
        directory
            .store
            .exec(
                "INSERT INTO entities (id, fingerprint, owner_user, class, name, privacy, public_material, published)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
                &[
                    Value::String(entity.to_hex()),
                    Value::String("fp".into()),
                    Value::Int(42),
                    Value::String("user".into()),
                    Value::String("alice".into()),
                    Value::String("public".into()),
                    Value::Bytes(vec![7u8; 32]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(directory.owner_of(entity).await.unwrap(), Some(42));
        assert_eq!(directory.public_material_of(&entity).await, Some([7u8; 32]));
    }
}
