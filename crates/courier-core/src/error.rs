//! Error taxonomy for the Courier mediator.
//!
//! The engine never retries and never suppresses a failure. Whatever a
//! handler or behavior returns travels back to the caller; only the
//! classification below is added around it.

use thiserror::Error;

use crate::message::MessageKind;

/// A boxed error type used by handlers for their domain failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by mediator dispatch and registration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MediatorError {
    /// A command or query was sent but no Main handler is registered for it.
    #[error("no {kind} handler registered for '{message}'")]
    HandlerNotFound {
        /// Message type name.
        message: &'static str,
        /// The kind it was sent as.
        kind: MessageKind,
    },

    /// A second Main handler was registered for a command or query.
    #[error("'{message}' already has handler '{existing}'; refusing '{rejected}'")]
    AmbiguousHandler {
        /// Message type name.
        message: &'static str,
        /// The handler registered first.
        existing: &'static str,
        /// The handler that was rejected.
        rejected: &'static str,
    },

    /// A message type was used as two different kinds.
    #[error("'{message}' is registered as a {registered}, not a {requested}")]
    KindConflict {
        /// Message type name.
        message: &'static str,
        /// Kind recorded at registration.
        registered: MessageKind,
        /// Kind requested by the caller.
        requested: MessageKind,
    },

    /// A handler or behavior failed. The original error is kept as-is.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The cancellation token fired during dispatch.
    #[error("dispatch cancelled")]
    Cancelled,

    /// The resolver could not produce a required instance.
    #[error("unresolved dependency: '{type_name}'")]
    UnresolvedDependency {
        /// Type that failed to resolve.
        type_name: &'static str,
    },

    /// The message in the envelope is not of the expected type.
    #[error("expected message '{expected}', envelope carries '{found}'")]
    MessageTypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Type name recorded in the envelope.
        found: &'static str,
    },

    /// The response produced by the chain is not of the expected type.
    #[error("response is not a '{expected}'")]
    ResponseTypeMismatch {
        /// Expected type name.
        expected: &'static str,
    },

    /// Several event handlers failed during a single publish.
    #[error("{} event handlers failed", .0.len())]
    Aggregate(Vec<MediatorError>),
}

impl MediatorError {
    /// Wraps a handler's boxed error.
    ///
    /// A `MediatorError` that was boxed on the way out (for instance a
    /// handler returning `Err(MediatorError::Cancelled.into())`) is unwrapped
    /// instead of being classified as a handler failure.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<MediatorError>() {
            Ok(inner) => *inner,
            Err(err) => Self::Handler(err),
        }
    }

    /// Creates a handler failure from any error value.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::from_boxed(err.into())
    }

    /// Creates a handler-not-found error for `M`.
    pub fn not_found<M: 'static>(kind: MessageKind) -> Self {
        Self::HandlerNotFound {
            message: std::any::type_name::<M>(),
            kind,
        }
    }

    /// Creates an unresolved-dependency error for `T`.
    pub fn unresolved<T: ?Sized + 'static>() -> Self {
        Self::UnresolvedDependency {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the original handler failure if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Handler(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns `true` if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if no Main handler was found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }
}

/// Result type for mediator operations.
pub type MediatorResult<T> = Result<T, MediatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("quantity must be positive")]
    struct Invalid;

    #[test]
    fn test_from_boxed_keeps_original_error() {
        let err = MediatorError::from_boxed(Box::new(Invalid));
        assert!(matches!(err, MediatorError::Handler(_)));
        assert!(err.downcast_ref::<Invalid>().is_some());
        assert_eq!(err.to_string(), "handler failed: quantity must be positive");
    }

    #[test]
    fn test_from_boxed_unwraps_mediator_error() {
        let err = MediatorError::from_boxed(Box::new(MediatorError::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_not_found_message() {
        struct Missing;
        let err = MediatorError::not_found::<Missing>(MessageKind::Query);
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("no query handler registered for"));
    }
}
