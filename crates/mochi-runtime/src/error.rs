use thiserror::Error;

/// Matches spec §4.4's error taxonomy surfaced to scripts: argument-shape,
/// permission, I/O, database, remote, timeout. Every variant round-trips
/// into a Starlark error value carrying `{kind, message}` (`host::to_starlark_error`).
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("script execution cancelled: {0}")]
    Cancelled(String),

    #[error("function '{0}' not found in namespace")]
    FunctionNotFound(String),

    #[error("script parse error: {0}")]
    Parse(String),
}

impl RuntimeError {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::Argument(_) => "argument",
            RuntimeError::Permission(_) => "permission",
            RuntimeError::Io(_) => "io",
            RuntimeError::Database(_) => "database",
            RuntimeError::Remote(_) => "remote",
            RuntimeError::Cancelled(_) => "timeout",
            RuntimeError::FunctionNotFound(_) => "argument",
            RuntimeError::Parse(_) => "argument",
        }
    }
}

impl From<mochi_core::CoreError> for RuntimeError {
    fn from(err: mochi_core::CoreError) -> Self {
        match err {
            mochi_core::CoreError::Argument(msg) => RuntimeError::Argument(msg),
            mochi_core::CoreError::Permission { permission, .. } => {
                RuntimeError::Permission(permission)
            }
            mochi_core::CoreError::NotFound(msg) => RuntimeError::Argument(msg),
            mochi_core::CoreError::RateLimited { retry_after_secs } => {
                RuntimeError::Remote(format!("rate limited, retry after {retry_after_secs}s"))
            }
            mochi_core::CoreError::Storage(msg) => RuntimeError::Database(msg),
            mochi_core::CoreError::Remote(msg) => RuntimeError::Remote(msg),
            mochi_core::CoreError::Timeout => RuntimeError::Cancelled("timeout".into()),
        }
    }
}

impl From<RuntimeError> for mochi_core::CoreError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Argument(msg) | RuntimeError::FunctionNotFound(msg) | RuntimeError::Parse(msg) => {
                mochi_core::CoreError::Argument(msg)
            }
            RuntimeError::Permission(permission) => mochi_core::CoreError::Permission {
                permission,
                restricted: true,
            },
            RuntimeError::Io(msg) | RuntimeError::Database(msg) => mochi_core::CoreError::Storage(msg),
            RuntimeError::Remote(msg) => mochi_core::CoreError::Remote(msg),
            RuntimeError::Cancelled(_) => mochi_core::CoreError::Timeout,
        }
    }
}
