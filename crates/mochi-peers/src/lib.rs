//! Peer connection pool (spec §4.9): entity -> address resolution, one
//! multiplexed session per address, child stream opening.

pub mod directory;
pub mod error;
pub mod pool;
pub mod quic;
pub mod transport;

pub use directory::PeerDirectory;
pub use error::PeerError;
pub use pool::PeerPool;
pub use quic::{IncomingSession, QuicListener, QuicTransport};
pub use transport::{Duplex, Session, Transport};
