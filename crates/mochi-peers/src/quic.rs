use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PeerError;
use crate::transport::{Duplex, Session, Transport};

/// TLS-over-QUIC transport, per spec §6's "e.g. TLS-over-QUIC with peer
/// certificates". Addresses are `host:port` strings resolved by the
/// directory subsystem; TLS identity is verified against the peer's
/// expected entity fingerprint by `verifier`.
pub struct QuicTransport {
    endpoint: quinn::Endpoint,
}

impl QuicTransport {
    pub fn new(endpoint: quinn::Endpoint) -> Self {
        QuicTransport { endpoint }
    }

    /// Builds a client endpoint trusting only certificates that match a
    /// peer's known entity fingerprint. Certificate validation against the
    /// directory's recorded fingerprints happens one layer up, in the
    /// `rustls::ClientConfig` the daemon constructs; this just binds the
    /// local socket.
    pub fn client(bind_addr: SocketAddr, client_config: quinn::ClientConfig) -> Result<Self, PeerError> {
        let mut endpoint =
            quinn::Endpoint::client(bind_addr).map_err(|e| PeerError::Transport(e.to_string()))?;
        endpoint.set_default_client_config(client_config);
        Ok(QuicTransport { endpoint })
    }
}

/// Server-side QUIC endpoint: accepts inbound peer connections rather than
/// establishing outbound ones. Kept separate from [`QuicTransport`] (which
/// implements the outbound-only [`Transport`] trait `PeerPool` consumes)
/// since accepting is a different shape of operation with no [`Session`]
/// counterpart to return until a connection has actually arrived.
pub struct QuicListener {
    endpoint: quinn::Endpoint,
}

impl QuicListener {
    pub fn bind(bind_addr: SocketAddr, server_config: quinn::ServerConfig) -> Result<Self, PeerError> {
        let endpoint = quinn::Endpoint::server(server_config, bind_addr)
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(QuicListener { endpoint })
    }

    /// Awaits the next inbound connection. Returns `None` once the endpoint
    /// has been closed (the accept loop's signal to stop).
    pub async fn accept(&self) -> Option<Result<IncomingSession, PeerError>> {
        let connecting = self.endpoint.accept().await?;
        Some(
            connecting
                .await
                .map(|connection| IncomingSession { connection })
                .map_err(|e| PeerError::Transport(e.to_string())),
        )
    }
}

/// One inbound connection, not yet known to belong to any particular peer
/// entity — that identity is only established once a `msg` exchange's
/// signature verifies (spec §4.7), which happens per-stream, not
/// per-connection.
pub struct IncomingSession {
    connection: quinn::Connection,
}

impl IncomingSession {
    /// Accepts the next inbound bidirectional child stream. Returns `None`
    /// once the peer closes the connection.
    pub async fn accept_stream(&self) -> Option<Result<Box<dyn Duplex>, PeerError>> {
        match self.connection.accept_bi().await {
            Ok((send, recv)) => Some(Ok(Box::new(tokio::io::join(recv, send)))),
            Err(quinn::ConnectionError::ApplicationClosed(_)) => None,
            Err(e) => Some(Err(PeerError::Transport(e.to_string()))),
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Session>, PeerError> {
        let server_name = host_of(address)?;
        let socket_addr = tokio::net::lookup_host(address)
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?
            .next()
            .ok_or_else(|| PeerError::Argument(format!("peer address '{address}' did not resolve")))?;
        let connecting = self
            .endpoint
            .connect(socket_addr, &server_name)
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        let connection = connecting.await.map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(Arc::new(QuicSession { connection }))
    }
}

struct QuicSession {
    connection: quinn::Connection,
}

#[async_trait]
impl Session for QuicSession {
    async fn open_stream(&self) -> Result<Box<dyn Duplex>, PeerError> {
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(Box::new(tokio::io::join(recv, send)))
    }

    fn is_closed(&self) -> bool {
        self.connection.close_reason().is_some()
    }
}

fn host_of(address: &str) -> Result<String, PeerError> {
    address
        .rsplit_once(':')
        .map(|(host, _port)| host.to_string())
        .ok_or_else(|| PeerError::Argument(format!("peer address '{address}' missing port")))
}
