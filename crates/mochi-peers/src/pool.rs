use std::collections::HashMap;
use std::sync::Arc;

use mochi_core::EntityId;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::directory::PeerDirectory;
use crate::error::PeerError;
use crate::transport::{Duplex, Session, Transport};

/// Maintains at most one live session per peer address and opens child
/// streams on it (spec §4.9). Mirrors `mochi-registry::AppRegistry`'s
/// `Arc<RwLock<HashMap<_, _>>>` shape, itself grounded on
/// `cave_kernel::CaveKernel`'s `instances` map.
pub struct PeerPool {
    directory: PeerDirectory,
    transport: Arc<dyn Transport>,
    sessions: RwLock<HashMap<String, Arc<dyn Session>>>,
}

impl PeerPool {
    pub fn new(directory: PeerDirectory, transport: Arc<dyn Transport>) -> Self {
        PeerPool {
            directory,
            transport,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn stream(&self, to_entity: EntityId) -> Result<Box<dyn Duplex>, PeerError> {
        let address = self
            .directory
            .resolve(to_entity)
            .await?
            .ok_or_else(|| PeerError::UnknownPeer(to_entity.to_hex()))?;

        let session = self.session_for(&address).await?;
        session.open_stream().await
    }

    async fn session_for(&self, address: &str) -> Result<Arc<dyn Session>, PeerError> {
        if let Some(session) = self.sessions.read().get(address) {
            if !session.is_closed() {
                return Ok(session.clone());
            }
        }

        debug!(address, "establishing new peer session");
        let session = self.transport.connect(address).await?;
        self.sessions.write().insert(address.to_string(), session.clone());
        Ok(session)
    }

    /// Drops sessions whose connection has failed. Called opportunistically
    /// by callers that observe a transport error on a child stream.
    pub fn evict_closed(&self) {
        self.sessions.write().retain(|_, session| !session.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mochi_store::{ensure_schema, PeersSchema, Store};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::io::duplex;

    struct LoopbackSession {
        closed: AtomicBool,
    }

    #[async_trait]
    impl Session for LoopbackSession {
        async fn open_stream(&self) -> Result<Box<dyn Duplex>, PeerError> {
            let (a, _b) = duplex(1024);
            Ok(Box::new(a))
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct LoopbackTransport {
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn connect(&self, _address: &str) -> Result<Arc<dyn Session>, PeerError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LoopbackSession {
                closed: AtomicBool::new(false),
            }))
        }
    }

    async fn fixture() -> (PeerPool, Arc<AtomicUsize>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("peers.db")).await.unwrap());
        ensure_schema(&store, &PeersSchema).await.unwrap();
        let directory = PeerDirectory::new(store);
        directory.upsert(EntityId([1u8; 32]), "loopback://a").await.unwrap();

        let connects = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(LoopbackTransport {
            connects: connects.clone(),
        });
        (PeerPool::new(directory, transport), connects)
    }

    #[tokio::test]
    async fn unresolved_entity_errors() {
        let (pool, _connects) = fixture().await;
        let err = pool.stream(EntityId([2u8; 32])).await.unwrap_err();
        assert!(matches!(err, PeerError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn repeated_streams_reuse_one_session() {
        let (pool, connects) = fixture().await;
        pool.stream(EntityId([1u8; 32])).await.unwrap();
        pool.stream(EntityId([1u8; 32])).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }
}
