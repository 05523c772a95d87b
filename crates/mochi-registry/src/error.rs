use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("app '{0}' not found")]
    AppNotFound(String),

    #[error("path '{0}' not registered")]
    PathNotFound(String),

    #[error("service '{0}' has no provider")]
    ServiceNotFound(String),

    #[error("event '{0}' has no handler on app '{1}'")]
    EventNotFound(String, String),

    #[error("service call recursion depth exceeded ({0})")]
    RecursionExceeded(u32),

    #[error(transparent)]
    Handler(#[from] mochi_core::CoreError),
}

impl From<RegistryError> for mochi_core::CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AppNotFound(id) => mochi_core::CoreError::NotFound(format!("app {id}")),
            RegistryError::PathNotFound(path) => {
                mochi_core::CoreError::NotFound(format!("path {path}"))
            }
            RegistryError::ServiceNotFound(service) => {
                mochi_core::CoreError::NotFound(format!("service {service}"))
            }
            RegistryError::EventNotFound(event, app) => {
                mochi_core::CoreError::NotFound(format!("event {event} on app {app}"))
            }
            RegistryError::RecursionExceeded(depth) => {
                mochi_core::CoreError::Argument(format!("recursion depth {depth} exceeded"))
            }
            RegistryError::Handler(core_err) => core_err,
        }
    }
}
