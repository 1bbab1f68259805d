//! Courier Runtime - configuration, logging and bootstrap for the Courier
//! mediator.
//!
//! This crate provides:
//! - Layered configuration ([`ConfigLoader`], [`CourierConfig`])
//! - Logging setup over `tracing-subscriber` ([`LoggingBuilder`])
//! - [`CourierRuntime`], which installs the configured built-in behaviors,
//!   validates registrations, optionally pre-builds every dispatch plan and
//!   owns the process mediator

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, DispatchConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros re-exported for applications.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
