use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<CryptoError> for mochi_core::CoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey(msg) => mochi_core::CoreError::Argument(msg),
            CryptoError::InvalidSignature(msg) => mochi_core::CoreError::Remote(msg),
            CryptoError::EmptyPassphrase => {
                mochi_core::CoreError::Argument("passphrase must not be empty".into())
            }
            CryptoError::EncryptionFailed | CryptoError::DecryptionFailed => {
                mochi_core::CoreError::Storage(err.to_string())
            }
            CryptoError::Encoding(msg) => mochi_core::CoreError::Argument(msg),
        }
    }
}
