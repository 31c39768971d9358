//! Shared types, config, and error handling for the ops autopilot incident-response pipeline.
//!
//! Every other crate in this workspace (`autopilot-store`, `autopilot-detector`, ...) depends on
//! this one for its data model, its `Error`/`Result`, its `Config`, and its resilience helpers
//! (`circuit_breaker`, `retry`).

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;

pub use circuit_breaker::{with_circuit_breaker, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{ComponentHealth, HealthLevel, HealthStatus};
pub use retry::{retry_for_error, retry_operation, RetryExecutor, RetryStrategy};
pub use types::*;
