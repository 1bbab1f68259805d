//! Tracing behavior.
//!
//! [`TracingBehavior`] opens one `dispatch` span per call, carrying the
//! message type and kind, and logs the outcome with its elapsed time.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, Level, debug, span, warn};

use courier_core::{MediatorResult, Request, Response};

use crate::behavior::{Next, PipelineBehavior};

/// Wraps the chain in a `dispatch` span.
///
/// Successful dispatches are logged at `DEBUG`, failures at `WARN`. The
/// runtime installs it as the outermost global behavior when
/// `dispatch.trace_dispatch` is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBehavior;

#[async_trait]
impl PipelineBehavior for TracingBehavior {
    async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            message_type = request.message_name(),
            kind = %request.kind()
        );
        let started = Instant::now();

        let result = next.run(request).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let _enter = span.enter();
        match &result {
            Ok(_) => debug!(elapsed_ms, "Dispatch completed"),
            Err(err) => warn!(elapsed_ms, error = %err, "Dispatch failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::{Container, MediatorError, MessageKind};
    use tokio_util::sync::CancellationToken;
    use tower::service_fn;

    use super::*;
    use crate::service::PipelineService;

    struct Probe;
    courier_core::query!(Probe => u8);

    #[tokio::test]
    async fn test_result_is_passed_through() {
        let next = Next::new(PipelineService::new(service_fn(|_: Request| async {
            Err::<Response, _>(MediatorError::Cancelled)
        })));
        let request = Request::new(
            Probe,
            MessageKind::Query,
            Arc::new(Container::new()),
            CancellationToken::new(),
        );
        let err = TracingBehavior.handle(request, next).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
