use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error(transparent)]
    Store(#[from] mochi_store::StoreError),

    #[error("permission denied: {permission}")]
    Denied { permission: String, restricted: bool },
}

impl From<PermissionError> for mochi_core::CoreError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::Store(store_err) => store_err.into(),
            PermissionError::Denied {
                permission,
                restricted,
            } => mochi_core::CoreError::Permission {
                permission,
                restricted,
            },
        }
    }
}
