use std::sync::Arc;

use chrono::Utc;
use mochi_core::{EntityId, Value};
use mochi_store::Store;

use crate::error::PeerError;

/// Reads and updates the `entity -> peer_address` mapping (`peers.db`,
/// spec §6), kept current by the directory subsystem elsewhere in the
/// daemon.
pub struct PeerDirectory {
    store: Arc<Store>,
}

impl PeerDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        PeerDirectory { store }
    }

    pub async fn resolve(&self, entity: EntityId) -> Result<Option<String>, PeerError> {
        let row = self
            .store
            .row(
                "SELECT address FROM peers WHERE entity = ?",
                &[Value::String(entity.to_hex())],
            )
            .await?;
        Ok(row.and_then(|r| r.get("address").and_then(Value::as_str).map(str::to_string)))
    }

    pub async fn upsert(&self, entity: EntityId, address: &str) -> Result<(), PeerError> {
        self.store
            .exec(
                "INSERT INTO peers (entity, address, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(entity) DO UPDATE SET address = excluded.address, updated_at = excluded.updated_at",
                &[
                    Value::String(entity.to_hex()),
                    Value::String(address.to_string()),
                    Value::String(Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_store::{ensure_schema, PeersSchema};

    async fn fixture() -> PeerDirectory {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("peers.db")).await.unwrap());
        ensure_schema(&store, &PeersSchema).await.unwrap();
        PeerDirectory::new(store)
    }

    #[tokio::test]
    async fn resolve_is_none_until_upserted() {
        let directory = fixture().await;
        let entity = EntityId([7u8; 32]);
        assert!(directory.resolve(entity).await.unwrap().is_none());

        directory.upsert(entity, "quic://peer.example:4433").await.unwrap();
        assert_eq!(
            directory.resolve(entity).await.unwrap().as_deref(),
            Some("quic://peer.example:4433")
        );
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_address() {
        let directory = fixture().await;
        let entity = EntityId([8u8; 32]);
        directory.upsert(entity, "quic://old:4433").await.unwrap();
        directory.upsert(entity, "quic://new:4433").await.unwrap();
        assert_eq!(
            directory.resolve(entity).await.unwrap().as_deref(),
            Some("quic://new:4433")
        );
    }
}
