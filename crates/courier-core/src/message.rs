//! Message taxonomy for the Courier mediator.
//!
//! Every value that travels through a mediator is a [`Message`]. The three
//! marker traits refine it into the shapes the engine dispatches differently:
//!
//! - [`Command`] – an intent to change state. Exactly one Main handler,
//!   optional result (use `()` for "no result").
//! - [`Query`] – a read request. Exactly one Main handler, mandatory result.
//! - [`Event`] – a fact that happened. Zero or more Main handlers, no result.
//!
//! Identity is by runtime type: two distinct command types never share a
//! dispatch plan, even if their fields are identical.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::{command, event, query};
//!
//! struct Increment { n: i64 }
//! command!(Increment => i64);
//!
//! struct CurrentTotal;
//! query!(CurrentTotal => i64);
//!
//! struct TotalChanged { total: i64 }
//! event!(TotalChanged);
//! ```

use std::fmt;

/// Classification of a message, fixed by the entry point it is sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// One handler, optional result.
    Command,
    /// One handler, mandatory result.
    Query,
    /// Zero or more handlers, no result.
    Event,
}

impl MessageKind {
    /// Returns `true` for shapes that produce a response (Command and Query).
    ///
    /// Request-shaped behaviors only wrap these kinds.
    pub fn has_response(self) -> bool {
        matches!(self, Self::Command | Self::Query)
    }

    /// Returns `true` when exactly one Main handler is required.
    pub fn requires_single_handler(self) -> bool {
        self.has_response()
    }

    /// Returns the lowercase name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base trait for everything a mediator can dispatch.
///
/// `Response` is what the Main handler produces. Events always use `()`.
/// `KIND` fixes how the type is dispatched, so processors registered before
/// (or without) a Main handler still know whether the type needs one.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a Courier message",
    label = "missing `Message` implementation",
    note = "use `command!`, `query!` or `event!` to declare the message shape"
)]
pub trait Message: Send + Sync + 'static {
    /// The value produced by the Main handler.
    type Response: Send + Sync + 'static;

    /// The kind this type is dispatched as.
    const KIND: MessageKind;
}

/// A message handled by exactly one handler that may produce a result.
pub trait Command: Message {}

/// A message handled by exactly one handler that always produces a result.
pub trait Query: Message {}

/// A message broadcast to zero or more handlers.
pub trait Event: Message<Response = ()> {}

/// Declares a [`Command`], optionally with its response type.
///
/// ```rust,ignore
/// command!(CreateUser => UserId);
/// command!(DeleteUser); // responds with ()
/// ```
#[macro_export]
macro_rules! command {
    ($ty:ty) => {
        $crate::command!($ty => ());
    };
    ($ty:ty => $res:ty) => {
        impl $crate::Message for $ty {
            type Response = $res;
            const KIND: $crate::MessageKind = $crate::MessageKind::Command;
        }
        impl $crate::Command for $ty {}
    };
}

/// Declares a [`Query`] and its response type.
#[macro_export]
macro_rules! query {
    ($ty:ty => $res:ty) => {
        impl $crate::Message for $ty {
            type Response = $res;
            const KIND: $crate::MessageKind = $crate::MessageKind::Query;
        }
        impl $crate::Query for $ty {}
    };
}

/// Declares an [`Event`].
#[macro_export]
macro_rules! event {
    ($ty:ty) => {
        impl $crate::Message for $ty {
            type Response = ();
            const KIND: $crate::MessageKind = $crate::MessageKind::Event;
        }
        impl $crate::Event for $ty {}
    };
}
