//! Runtime error types.

use thiserror::Error;

use courier_core::MediatorError;

use crate::config::ConfigError;

/// Errors that can occur while assembling the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A registration or warm-up step failed.
    #[error(transparent)]
    Mediator(#[from] MediatorError),

    /// Processors are registered for commands or queries without a handler.
    #[error("processors registered without a handler: {}", .0.join(", "))]
    UnhandledMessages(Vec<&'static str>),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
