//! Handler traits.
//!
//! A message type has up to three roles attached to it:
//!
//! - [`Handler`] – the Main handler doing the business logic. Commands and
//!   queries have exactly one; events have any number.
//! - [`PreProcessor`] – runs before the Main handler(s), in registration
//!   order. A failure aborts the dispatch before anything else runs.
//! - [`PostProcessor`] – runs after the Main handler(s) succeeded, in
//!   registration order, and sees the response.
//!
//! Handlers borrow the message; the engine keeps ownership so that
//! post-processors and sibling event handlers can see the same value.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{Handler, async_trait};
//!
//! struct IncrementHandler;
//!
//! #[async_trait]
//! impl Handler<Increment> for IncrementHandler {
//!     async fn handle(&self, cmd: &Increment, _: &CancellationToken) -> Result<i64, BoxError> {
//!         Ok(cmd.n + 1)
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use courier_core::{BoxError, Message};

/// The Main handler for a message type.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    /// Handles `message`, producing its response.
    ///
    /// Long-running handlers should watch `token` and return
    /// `Err(MediatorError::Cancelled.into())` when it fires.
    async fn handle(&self, message: &M, token: &CancellationToken) -> Result<M::Response, BoxError>;
}

/// A cross-cutting step that runs before the Main handler.
#[async_trait]
pub trait PreProcessor<M: Message>: Send + Sync + 'static {
    /// Inspects `message`. Returning an error aborts the dispatch.
    async fn process(&self, message: &M, token: &CancellationToken) -> Result<(), BoxError>;
}

/// A cross-cutting step that runs after the Main handler succeeded.
#[async_trait]
pub trait PostProcessor<M: Message>: Send + Sync + 'static {
    /// Inspects `message` together with the Main handler's `response`.
    async fn process(
        &self,
        message: &M,
        response: &M::Response,
        token: &CancellationToken,
    ) -> Result<(), BoxError>;
}
