use async_trait::async_trait;
use mochi_core::{CoreError, Value};

use crate::types::{Action, Event};

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, action: Action) -> Result<Value, CoreError>;
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), CoreError>;
}

/// Intra-node cross-app calls. `depth` is the caller's current recursion
/// depth (starts at 0 for the first hop); implementations must not inspect
/// it beyond passing it forward — the registry is the sole depth enforcer.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn call(&self, function: &str, params: Value, depth: u32) -> Result<Value, CoreError>;
}
