use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error(transparent)]
    Store(#[from] mochi_store::StoreError),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl From<SchedulerError> for mochi_core::CoreError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Argument(msg) => mochi_core::CoreError::Argument(msg),
            SchedulerError::Store(store_err) => store_err.into(),
            SchedulerError::Dispatch(msg) => mochi_core::CoreError::Remote(msg),
        }
    }
}
