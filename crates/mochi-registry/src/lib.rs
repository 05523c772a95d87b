pub mod error;
pub mod handler;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use handler::{ActionHandler, EventHandler, ServiceHandler};
pub use registry::{AppEntry, AppRegistry, DEFAULT_HANDLER_KEY, MAX_SERVICE_CALL_DEPTH};
pub use types::{Action, Event, EventRoute, EventSource};
