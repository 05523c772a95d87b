use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported column type for column '{0}'")]
    UnsupportedColumn(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<StoreError> for mochi_core::CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Argument(msg) => mochi_core::CoreError::Argument(msg),
            other => mochi_core::CoreError::Storage(other.to_string()),
        }
    }
}
