use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame exceeds size cap ({0} > {1} bytes)")]
    FrameTooLarge(usize, usize),

    #[error("frame structure exceeds bounds: {0}")]
    StructureTooLarge(String),

    #[error("malformed CBOR: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("stream closed")]
    Closed,

    #[error("deadline exceeded")]
    Timeout,
}

impl From<WireError> for mochi_core::CoreError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Timeout => mochi_core::CoreError::Timeout,
            WireError::InvalidSignature | WireError::UnknownEntity(_) => {
                mochi_core::CoreError::Remote(err.to_string())
            }
            other => mochi_core::CoreError::Remote(other.to_string()),
        }
    }
}
