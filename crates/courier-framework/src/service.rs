//! Tower services that make up a dispatch plan.
//!
//! Every stage is a `tower::Service<Request>` and every wrapper is a
//! [`Layer`]. The composer stacks them and boxes the result after each step
//! so that a plan is a single [`PipelineService`] regardless of its depth.
//!
//! Stages do not buffer or hold capacity, so `poll_ready` is always ready
//! and inner services are cloned per call.

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use tracing::{trace, warn};

use courier_core::{MediatorError, MediatorResult, Request, Response};

use crate::behavior::{BehaviorEntry, Next};
use crate::registry::{Entry, MainFn, PostFn, PreFn};

/// The boxed, cloneable service every stage is erased to.
pub type PipelineService = BoxCloneSyncService<Request, Response, MediatorError>;

/// Runs `fut` unless `token` fires first.
async fn until_cancelled<T>(
    token: &CancellationToken,
    fut: impl Future<Output = MediatorResult<T>>,
) -> MediatorResult<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(MediatorError::Cancelled),
        result = fut => result,
    }
}

// ============================================================================
// Behaviors
// ============================================================================

/// Lifts a [`BehaviorEntry`] into a tower layer.
#[derive(Clone, Debug)]
pub struct BehaviorLayer {
    entry: BehaviorEntry,
}

impl BehaviorLayer {
    /// Wraps every inner service with the behavior described by `entry`.
    pub fn new(entry: BehaviorEntry) -> Self {
        Self { entry }
    }
}

impl Layer<PipelineService> for BehaviorLayer {
    type Service = BehaviorService;

    fn layer(&self, inner: PipelineService) -> Self::Service {
        BehaviorService {
            entry: self.entry.clone(),
            inner,
        }
    }
}

/// A behavior wrapped around the rest of the chain.
#[derive(Clone)]
pub struct BehaviorService {
    entry: BehaviorEntry,
    inner: PipelineService,
}

impl Service<Request> for BehaviorService {
    type Response = Response;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let entry = self.entry.clone();
        let next = Next::new(self.inner.clone());
        async move {
            request.ensure_active()?;
            let behavior = entry.build(&request)?;
            trace!(behavior = entry.name(), "Entering behavior");
            behavior.handle(request, next).await
        }
        .boxed()
    }
}

// ============================================================================
// Pre / Post processors
// ============================================================================

/// Runs pre-processors, in order, before the inner service.
#[derive(Clone)]
pub struct PreProcessLayer {
    processors: Arc<[Entry<PreFn>]>,
}

impl PreProcessLayer {
    pub(crate) fn new(processors: &[Entry<PreFn>]) -> Self {
        Self {
            processors: processors.into(),
        }
    }
}

impl Layer<PipelineService> for PreProcessLayer {
    type Service = PreProcessService;

    fn layer(&self, inner: PipelineService) -> Self::Service {
        PreProcessService {
            processors: self.processors.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct PreProcessService {
    processors: Arc<[Entry<PreFn>]>,
    inner: PipelineService,
}

impl Service<Request> for PreProcessService {
    type Response = Response;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let processors = self.processors.clone();
        let inner = self.inner.clone();
        async move {
            for entry in processors.iter() {
                request.ensure_active()?;
                trace!(handler = entry.descriptor.handler_name, "Running pre-processor");
                (entry.invoke)(&request).await?;
            }
            inner.oneshot(request).await
        }
        .boxed()
    }
}

/// Runs post-processors, in order, after the inner service succeeded.
#[derive(Clone)]
pub struct PostProcessLayer {
    processors: Arc<[Entry<PostFn>]>,
}

impl PostProcessLayer {
    pub(crate) fn new(processors: &[Entry<PostFn>]) -> Self {
        Self {
            processors: processors.into(),
        }
    }
}

impl Layer<PipelineService> for PostProcessLayer {
    type Service = PostProcessService;

    fn layer(&self, inner: PipelineService) -> Self::Service {
        PostProcessService {
            processors: self.processors.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct PostProcessService {
    processors: Arc<[Entry<PostFn>]>,
    inner: PipelineService,
}

impl Service<Request> for PostProcessService {
    type Response = Response;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let processors = self.processors.clone();
        let inner = self.inner.clone();
        async move {
            let response = inner.oneshot(request.clone()).await?;
            for entry in processors.iter() {
                request.ensure_active()?;
                trace!(handler = entry.descriptor.handler_name, "Running post-processor");
                (entry.invoke)(&request, &response).await?;
            }
            Ok(response)
        }
        .boxed()
    }
}

// ============================================================================
// Terminal services
// ============================================================================

/// Invokes the single Main handler of a command or query.
#[derive(Clone)]
pub struct MainHandlerService {
    handler: Entry<MainFn>,
}

impl MainHandlerService {
    pub(crate) fn new(handler: Entry<MainFn>) -> Self {
        Self { handler }
    }
}

impl Service<Request> for MainHandlerService {
    type Response = Response;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let handler = self.handler;
        async move {
            request.ensure_active()?;
            trace!(handler = handler.descriptor.handler_name, "Invoking handler");
            until_cancelled(request.token(), (handler.invoke)(&request)).await
        }
        .boxed()
    }
}

/// Invokes every Main handler of an event.
///
/// Handlers run one after another in registration order. A failing handler
/// does not stop its siblings; a single failure is returned as-is and
/// several are returned as [`MediatorError::Aggregate`]. Cancellation stops
/// the remaining handlers.
#[derive(Clone)]
pub struct BroadcastService {
    handlers: Arc<[Entry<MainFn>]>,
}

impl BroadcastService {
    pub(crate) fn new(handlers: &[Entry<MainFn>]) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }
}

impl Service<Request> for BroadcastService {
    type Response = Response;
    type Error = MediatorError;
    type Future = BoxFuture<'static, MediatorResult<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let handlers = self.handlers.clone();
        async move {
            let mut failures = Vec::new();
            for handler in handlers.iter() {
                request.ensure_active()?;
                trace!(handler = handler.descriptor.handler_name, "Invoking event handler");
                match until_cancelled(request.token(), (handler.invoke)(&request)).await {
                    Ok(_) => {}
                    Err(MediatorError::Cancelled) => return Err(MediatorError::Cancelled),
                    Err(err) => {
                        warn!(
                            handler = handler.descriptor.handler_name,
                            error = %err,
                            "Event handler failed"
                        );
                        failures.push(err);
                    }
                }
            }

            match failures.len() {
                0 => Ok(Response::unit()),
                1 => Err(failures.remove(0)),
                _ => Err(MediatorError::Aggregate(failures)),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Container, MessageKind};

    struct Nudge;
    courier_core::command!(Nudge);

    fn request() -> Request {
        Request::new(
            Nudge,
            MessageKind::Command,
            Arc::new(Container::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_empty_broadcast_is_a_noop() {
        let service = BroadcastService::new(&[]);
        let response = service.oneshot(request()).await.unwrap();
        assert!(response.is::<()>());
    }

    #[tokio::test]
    async fn test_until_cancelled_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = until_cancelled(&token, async { Ok(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
