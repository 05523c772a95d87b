use thiserror::Error;

/// Error taxonomy shared across every subsystem, per the core's error design.
///
/// Subsystems define their own `thiserror` enums for local detail but convert
/// into this shape at the boundary a script or peer ultimately observes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("argument error: {0}")]
    Argument(String),

    #[error("permission denied: {permission}")]
    Permission {
        permission: String,
        restricted: bool,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("timeout")]
    Timeout,
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Argument(_) => "argument",
            CoreError::Permission { .. } => "permission",
            CoreError::NotFound(_) => "not_found",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::Storage(_) => "storage",
            CoreError::Remote(_) => "remote",
            CoreError::Timeout => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(CoreError::Argument("x".into()).kind(), "argument");
        assert_eq!(
            CoreError::Permission {
                permission: "url:example.com".into(),
                restricted: false
            }
            .kind(),
            "permission"
        );
        assert_eq!(CoreError::Timeout.kind(), "timeout");
    }
}
