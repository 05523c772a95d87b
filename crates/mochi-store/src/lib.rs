pub mod error;
pub mod global;
pub mod manager;
pub mod migrate;
pub mod store;

pub use error::StoreError;
pub use global::{
    DirectorySchema, PeersSchema, QueueSchema, ScheduleSchema, SettingsSchema, UsersSchema,
};
pub use manager::StoreManager;
pub use migrate::{ensure_schema, SchemaMigrator};
pub use store::Store;
