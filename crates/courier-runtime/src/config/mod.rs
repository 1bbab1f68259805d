//! Configuration for the Courier runtime.
//!
//! Settings are layered with figment (defaults, files, `COURIER_*`
//! environment variables, programmatic overrides) and validated before the
//! runtime uses them.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
