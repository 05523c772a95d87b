use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::PeerError;

/// A bidirectional child stream, independent in flow control but riding the
/// authenticated transport of its parent session (spec §4.9).
pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

/// One long-lived authenticated multiplexed connection to a peer address.
#[async_trait]
pub trait Session: Send + Sync {
    async fn open_stream(&self) -> Result<Box<dyn Duplex>, PeerError>;

    /// `true` once the underlying connection has failed; the pool evicts
    /// dead sessions rather than retrying them.
    fn is_closed(&self) -> bool;
}

/// Establishes sessions to peer addresses. Production wiring is
/// `QuicTransport` (TLS-over-QUIC, spec §6); tests substitute an in-process
/// loopback transport so the pool's eviction/reuse logic is verifiable
/// without real sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, address: &str) -> Result<std::sync::Arc<dyn Session>, PeerError>;
}
