//! Sandboxed per-app script runtime (spec §4.4): Starlark evaluation with a
//! bounded host capability surface, process-wide concurrency limits, and a
//! step-cap/wall-clock cancellation contract.

pub mod config;
pub mod error;
pub mod host;
pub mod namespace;
pub mod value_bridge;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use namespace::{CallEnv, EvaluationGate, Namespace};
