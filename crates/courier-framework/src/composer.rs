//! Pipeline composition.
//!
//! [`PipelineComposer`] turns one message type's registration plus the
//! behavior configuration into a [`DispatchPlan`]. Layers are applied
//! innermost first:
//!
//! 1. terminal: the Main handler, or every event handler
//! 2. post-processors
//! 3. pre-processors
//! 4. kind behaviors, then request-shaped behaviors, then global behaviors,
//!    each tier wrapped in reverse so its first entry ends up outermost
//!
//! A missing Main handler is reported before anything is built, so no stage
//! of a broken plan ever runs.

use std::any::TypeId;
use std::fmt;

use tower::{Layer, ServiceExt};
use tracing::debug;

use courier_core::{MediatorError, MediatorResult, MessageKind, Request, Response};

use crate::behavior::PipelineConfig;
use crate::registry::HandlerRegistry;
use crate::service::{
    BehaviorLayer, BroadcastService, MainHandlerService, PipelineService, PostProcessLayer,
    PreProcessLayer,
};

/// The compiled, reusable chain for one message type.
///
/// Plans hold no per-call state and may be invoked concurrently.
pub struct DispatchPlan {
    message_name: &'static str,
    kind: MessageKind,
    depth: usize,
    service: PipelineService,
}

impl DispatchPlan {
    /// Name of the message type the plan dispatches.
    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    /// Kind the plan dispatches as.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Number of stages wrapped around the terminal service.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Runs the chain for one request.
    pub async fn invoke(&self, request: Request) -> MediatorResult<Response> {
        self.service.clone().oneshot(request).await
    }
}

impl fmt::Debug for DispatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPlan")
            .field("message", &self.message_name)
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Builds dispatch plans from a frozen registry and behavior configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineComposer<'a> {
    registry: &'a HandlerRegistry,
    config: &'a PipelineConfig,
}

impl<'a> PipelineComposer<'a> {
    /// Creates a composer over a frozen registry and behavior configuration.
    pub fn new(registry: &'a HandlerRegistry, config: &'a PipelineConfig) -> Self {
        Self { registry, config }
    }

    /// Composes the plan for `message_type` dispatched as `kind`.
    pub fn compose(
        &self,
        message_type: TypeId,
        message_name: &'static str,
        kind: MessageKind,
    ) -> MediatorResult<DispatchPlan> {
        let registration = self.registry.lookup(message_type);

        if let Some(registered) = registration
            .map(|r| r.kind())
            .filter(|registered| *registered != kind)
        {
            return Err(MediatorError::KindConflict {
                message: message_name,
                registered,
                requested: kind,
            });
        }

        let (main, pre, post) = match registration {
            Some(r) => (r.main.as_slice(), r.pre.as_slice(), r.post.as_slice()),
            None => (&[][..], &[][..], &[][..]),
        };

        let mut service = if kind.requires_single_handler() {
            let handler = main
                .first()
                .copied()
                .ok_or(MediatorError::HandlerNotFound {
                    message: message_name,
                    kind,
                })?;
            PipelineService::new(MainHandlerService::new(handler))
        } else {
            PipelineService::new(BroadcastService::new(main))
        };
        let mut depth = 0;

        if !post.is_empty() {
            service = PipelineService::new(PostProcessLayer::new(post).layer(service));
            depth += 1;
        }
        if !pre.is_empty() {
            service = PipelineService::new(PreProcessLayer::new(pre).layer(service));
            depth += 1;
        }

        let tiers: Vec<_> = self.config.behaviors_for(kind).collect();
        for (_, entries) in tiers.into_iter().rev() {
            for entry in entries.iter().rev() {
                service = PipelineService::new(BehaviorLayer::new(entry.clone()).layer(service));
                depth += 1;
            }
        }

        debug!(
            message_type = message_name,
            kind = %kind,
            handlers = main.len(),
            pre = pre.len(),
            post = post.len(),
            depth,
            "Composed dispatch plan"
        );

        Ok(DispatchPlan {
            message_name,
            kind,
            depth,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use courier_core::{BoxError, Container, Message};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::behavior::{Next, PipelineBehavior};
    use crate::handler::{Handler, PreProcessor};

    struct Lookup;
    courier_core::query!(Lookup => u32);

    struct Seen;
    courier_core::event!(Seen);

    struct Answer;
    #[async_trait]
    impl Handler<Lookup> for Answer {
        async fn handle(&self, _: &Lookup, _: &CancellationToken) -> Result<u32, BoxError> {
            Ok(42)
        }
    }

    struct Check;
    #[async_trait]
    impl PreProcessor<Lookup> for Check {
        async fn process(&self, _: &Lookup, _: &CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Pass;
    #[async_trait]
    impl PipelineBehavior for Pass {
        async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response> {
            next.run(request).await
        }
    }

    fn compose<M: Message>(
        registry: &HandlerRegistry,
        config: &PipelineConfig,
        kind: MessageKind,
    ) -> MediatorResult<DispatchPlan> {
        PipelineComposer::new(registry, config).compose(
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            kind,
        )
    }

    #[test]
    fn test_missing_main_handler_fails_before_build() {
        let mut registry = HandlerRegistry::new();
        registry.register_pre::<Lookup, Check>().unwrap();
        let err = compose::<Lookup>(&registry, &PipelineConfig::new(), MessageKind::Query)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_kind_conflict_is_reported() {
        let mut registry = HandlerRegistry::new();
        registry.register_query::<Lookup, Answer>().unwrap();
        let err = compose::<Lookup>(&registry, &PipelineConfig::new(), MessageKind::Event)
            .unwrap_err();
        assert!(matches!(err, MediatorError::KindConflict { .. }));
    }

    #[test]
    fn test_depth_counts_applicable_tiers() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_query::<Lookup, Answer>()
            .unwrap()
            .register_pre::<Lookup, Check>()
            .unwrap();
        let mut config = PipelineConfig::new();
        config
            .add_global_instance(Pass)
            .add_request_shaped_instance(Pass)
            .add_for_kind_instance(MessageKind::Command, Pass);

        let plan = compose::<Lookup>(&registry, &config, MessageKind::Query).unwrap();
        assert_eq!(plan.kind(), MessageKind::Query);
        assert_eq!(plan.depth(), 3);

        let plan = compose::<Seen>(&HandlerRegistry::new(), &config, MessageKind::Event).unwrap();
        assert_eq!(plan.depth(), 1);
    }

    #[tokio::test]
    async fn test_plan_invokes_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register_query::<Lookup, Answer>().unwrap();
        let mut container = Container::new();
        container.register_instance(Answer);

        let plan = compose::<Lookup>(&registry, &PipelineConfig::new(), MessageKind::Query).unwrap();
        let request = Request::new(
            Lookup,
            MessageKind::Query,
            Arc::new(container),
            CancellationToken::new(),
        );
        let response = plan.invoke(request).await.unwrap();
        assert_eq!(response.downcast::<u32>().unwrap(), 42);
    }
}
