use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error(transparent)]
    Store(#[from] mochi_store::StoreError),

    #[error("unknown peer address for entity '{0}'")]
    UnknownPeer(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Wire(#[from] mochi_wire::WireError),
}

impl From<PeerError> for mochi_core::CoreError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::Argument(msg) => mochi_core::CoreError::Argument(msg),
            PeerError::Store(store_err) => store_err.into(),
            PeerError::UnknownPeer(entity) => mochi_core::CoreError::NotFound(entity),
            PeerError::Transport(msg) => mochi_core::CoreError::Remote(msg),
            PeerError::Wire(wire_err) => wire_err.into(),
        }
    }
}
