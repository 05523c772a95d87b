pub mod error;
pub mod model;
pub mod value;

pub use error::CoreError;
pub use model::{
    App, AppKind, AppVersion, EncryptedKey, Entity, EntityId, EventData, Headers, Message,
    MessageStatus, MessageType, PermissionGrant, Privacy, RateLimitEntry, ScheduledEvent, User,
    UserRole, WireMessageType,
};
pub use value::{StreamId, Value};

pub type CoreResult<T> = Result<T, CoreError>;
