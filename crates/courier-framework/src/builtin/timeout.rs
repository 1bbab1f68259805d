//! Deadline behavior.
//!
//! [`TimeoutBehavior`] races the rest of the chain against a timer and
//! reports [`DispatchTimeout`] as a handler failure when the timer wins.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use courier_core::{MediatorError, MediatorResult, Request, Response};

use crate::behavior::{Next, PipelineBehavior};

/// The failure reported when a dispatch exceeds its deadline.
#[derive(Debug, Clone, Copy, Error)]
#[error("dispatch timed out after {after:?}")]
pub struct DispatchTimeout {
    /// The configured deadline.
    pub after: Duration,
}

/// Fails the dispatch if the inner chain does not finish within `duration`.
///
/// Inner stages receive a child of the caller's token, which is cancelled on
/// expiry so that handlers still running can stop early.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBehavior {
    duration: Duration,
}

impl TimeoutBehavior {
    /// Creates a behavior failing dispatches that run longer than `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl PipelineBehavior for TimeoutBehavior {
    async fn handle(&self, mut request: Request, next: Next) -> MediatorResult<Response> {
        let child = request.token().child_token();
        request.set_token(child.clone());
        let message = request.message_name();

        match tokio::time::timeout(self.duration, next.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                warn!(message_type = message, after = ?self.duration, "Dispatch timed out");
                Err(MediatorError::handler(DispatchTimeout {
                    after: self.duration,
                }))
            }
        }
    }
}
