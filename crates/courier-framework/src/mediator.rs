//! The public entry points.
//!
//! [`Mediator`] owns the frozen registry and behavior configuration, the
//! plan cache, and the resolver used to obtain handler instances. It is
//! cheap to clone; clones share the cache.
//!
//! The three narrow capabilities ([`CommandSender`], [`QuerySender`],
//! [`EventPublisher`]) let components depend on only the shape they use.
//!
//! # Event publishing
//!
//! Event handlers run sequentially in registration order. Each one runs
//! even if an earlier sibling failed; one failure is returned unchanged,
//! several come back as [`MediatorError::Aggregate`] in registration order.
//! Cancellation stops the remaining handlers. Post-processors only run when
//! every handler succeeded. Publishing an event with no handlers succeeds.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, span, warn};

use courier_core::{
    Command, Event, MediatorResult, Message, MessageKind, Query, Request, Resolver,
};

use crate::behavior::PipelineConfig;
use crate::cache::DispatcherCache;
use crate::composer::{DispatchPlan, PipelineComposer};
use crate::registry::HandlerRegistry;

/// Dispatches commands, queries and events through their cached plans.
#[derive(Clone)]
pub struct Mediator {
    registry: Arc<HandlerRegistry>,
    config: Arc<PipelineConfig>,
    cache: Arc<DispatcherCache>,
    resolver: Arc<dyn Resolver>,
}

impl Mediator {
    /// Freezes `registry` and `config` behind a new mediator.
    pub fn new(
        registry: HandlerRegistry,
        config: PipelineConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        debug!(
            message_types = registry.len(),
            behaviors = config.len(),
            "Mediator created"
        );
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            cache: Arc::new(DispatcherCache::new()),
            resolver,
        }
    }

    /// Returns a mediator sharing registry, configuration and cache but
    /// resolving instances through `resolver`, e.g. a per-request scope.
    pub fn with_resolver(&self, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
            resolver,
        }
    }

    /// Sends a command to its handler.
    pub async fn send_command<C: Command>(&self, command: C) -> MediatorResult<C::Response> {
        self.send_command_with_token(command, CancellationToken::new())
            .await
    }

    /// Sends a command, aborting when `token` is cancelled.
    pub async fn send_command_with_token<C: Command>(
        &self,
        command: C,
        token: CancellationToken,
    ) -> MediatorResult<C::Response> {
        self.dispatch(command, MessageKind::Command, token).await
    }

    /// Sends a query to its handler.
    pub async fn send_query<Q: Query>(&self, query: Q) -> MediatorResult<Q::Response> {
        self.send_query_with_token(query, CancellationToken::new())
            .await
    }

    /// Sends a query, aborting when `token` is cancelled.
    pub async fn send_query_with_token<Q: Query>(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> MediatorResult<Q::Response> {
        self.dispatch(query, MessageKind::Query, token).await
    }

    /// Publishes an event to all of its handlers.
    pub async fn publish<E: Event>(&self, event: E) -> MediatorResult<()> {
        self.publish_with_token(event, CancellationToken::new())
            .await
    }

    /// Publishes an event, aborting when `token` is cancelled.
    pub async fn publish_with_token<E: Event>(
        &self,
        event: E,
        token: CancellationToken,
    ) -> MediatorResult<()> {
        self.dispatch(event, MessageKind::Event, token).await
    }

    async fn dispatch<M: Message>(
        &self,
        message: M,
        kind: MessageKind,
        token: CancellationToken,
    ) -> MediatorResult<M::Response> {
        let message_name = std::any::type_name::<M>();
        let plan = self.plan_for(TypeId::of::<M>(), message_name, kind)?;

        let request = Request::new(message, kind, Arc::clone(&self.resolver), token);
        request.ensure_active()?;

        let span = span!(Level::TRACE, "mediator", message_type = message_name, kind = %kind);
        let response = plan.invoke(request).instrument(span).await?;
        response.downcast::<M::Response>()
    }

    fn plan_for(
        &self,
        message_type: TypeId,
        message_name: &'static str,
        kind: MessageKind,
    ) -> MediatorResult<Arc<DispatchPlan>> {
        self.cache.get_or_build(message_type, kind, || {
            PipelineComposer::new(&self.registry, &self.config).compose(
                message_type,
                message_name,
                kind,
            )
        })
    }

    /// Builds the plan of every message type that has a Main handler, and of
    /// every event (an event without handlers still gets its no-op plan).
    ///
    /// Returns the number of plans now cached.
    pub fn warm_up(&self) -> MediatorResult<usize> {
        for (message_type, message_name, kind) in self.registry.message_types() {
            self.plan_for(message_type, message_name, kind)?;
        }
        debug!(plans = self.cache.len(), "Dispatch plans warmed up");
        Ok(self.cache.len())
    }

    /// Returns the names of commands and queries that have pre/post-processors
    /// but no Main handler. Sending one of them fails. Events never appear
    /// here since publishing to zero handlers succeeds.
    pub fn validate(&self) -> Vec<&'static str> {
        let orphans = self.registry.orphans();
        for name in &orphans {
            warn!(message_type = name, "Processors registered without a handler");
        }
        orphans
    }

    /// The frozen handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The frozen behavior configuration.
    pub fn pipeline(&self) -> &PipelineConfig {
        &self.config
    }

    /// The plan cache shared by all clones of this mediator.
    pub fn cache(&self) -> &DispatcherCache {
        &self.cache
    }

    /// The resolver used for handler instances.
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("registry", &self.registry)
            .field("behaviors", &self.config.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Sends commands.
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Sends `command` to its handler, aborting when `token` is cancelled.
    async fn send<C: Command>(
        &self,
        command: C,
        token: CancellationToken,
    ) -> MediatorResult<C::Response>;
}

/// Sends queries.
#[async_trait]
pub trait QuerySender: Send + Sync {
    /// Sends `query` to its handler, aborting when `token` is cancelled.
    async fn ask<Q: Query>(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> MediatorResult<Q::Response>;
}

/// Publishes events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `event` to all of its handlers.
    async fn emit<E: Event>(&self, event: E, token: CancellationToken) -> MediatorResult<()>;
}

#[async_trait]
impl CommandSender for Mediator {
    async fn send<C: Command>(
        &self,
        command: C,
        token: CancellationToken,
    ) -> MediatorResult<C::Response> {
        self.send_command_with_token(command, token).await
    }
}

#[async_trait]
impl QuerySender for Mediator {
    async fn ask<Q: Query>(
        &self,
        query: Q,
        token: CancellationToken,
    ) -> MediatorResult<Q::Response> {
        self.send_query_with_token(query, token).await
    }
}

#[async_trait]
impl EventPublisher for Mediator {
    async fn emit<E: Event>(&self, event: E, token: CancellationToken) -> MediatorResult<()> {
        self.publish_with_token(event, token).await
    }
}
