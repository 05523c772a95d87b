use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error(transparent)]
    Store(#[from] mochi_store::StoreError),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("message not found")]
    NotFound,
}

impl From<QueueError> for mochi_core::CoreError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Argument(msg) => mochi_core::CoreError::Argument(msg),
            QueueError::Store(store_err) => store_err.into(),
            QueueError::Delivery(msg) => mochi_core::CoreError::Remote(msg),
            QueueError::NotFound => mochi_core::CoreError::NotFound("queue message".into()),
        }
    }
}
