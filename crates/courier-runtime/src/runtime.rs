//! Runtime bootstrap.
//!
//! [`CourierRuntime`] is the long-lived object owning the process mediator.
//! Registration happens on the [`RuntimeBuilder`]; `build()` freezes it.
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_command::<Increment, IncrementHandler>()?;
//!
//! let runtime = CourierRuntime::builder()
//!     .registry(registry)
//!     .resolver(Arc::new(container))
//!     .load_config()?
//!     .build()?;
//!
//! runtime.mediator().send_command(Increment { n: 5 }).await?;
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use courier_core::{Container, Resolver};
use courier_framework::{
    BehaviorEntry, HandlerRegistry, Mediator, PipelineConfig, PipelineTier, TimeoutBehavior,
    TracingBehavior,
};

use crate::config::{ConfigLoader, CourierConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The assembled mediator together with the configuration it was built from.
#[derive(Debug, Clone)]
pub struct CourierRuntime {
    config: CourierConfig,
    mediator: Mediator,
}

impl CourierRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The process mediator.
    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    /// The configuration the runtime was built from.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }
}

/// Collects registrations, behaviors, the resolver and configuration.
pub struct RuntimeBuilder {
    registry: HandlerRegistry,
    pipeline: PipelineConfig,
    resolver: Option<Arc<dyn Resolver>>,
    config: CourierConfig,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with an empty registry, no behaviors and default
    /// configuration.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            pipeline: PipelineConfig::new(),
            resolver: None,
            config: CourierConfig::default(),
            init_logging: false,
        }
    }

    /// Replaces the handler registry.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Gives access to the handler registry for in-place registration.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Replaces the behavior configuration.
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Gives access to the behavior configuration.
    pub fn pipeline_mut(&mut self) -> &mut PipelineConfig {
        &mut self.pipeline
    }

    /// Sets the resolver handlers and behaviors are obtained from.
    ///
    /// Defaults to an empty [`Container`].
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Uses an already loaded configuration.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads configuration from the default locations.
    pub fn load_config(self) -> RuntimeResult<Self> {
        self.load_config_with(ConfigLoader::new())
    }

    /// Loads configuration through `loader`.
    pub fn load_config_with(mut self, loader: ConfigLoader) -> RuntimeResult<Self> {
        self.config = loader.load()?;
        Ok(self)
    }

    /// Installs the global tracing subscriber from `logging` settings.
    pub fn with_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    /// Validates configuration and registrations and freezes the mediator.
    ///
    /// Configured built-in behaviors become the outermost global behaviors:
    /// tracing first, then the default timeout.
    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        validate_config(&self.config)?;
        if self.init_logging {
            logging::init_from_config(&self.config.logging);
        }

        let dispatch = &self.config.dispatch;
        let mut pipeline = self.pipeline;
        if let Some(timeout) = dispatch.default_timeout() {
            pipeline.prepend(
                PipelineTier::Global,
                BehaviorEntry::instance(TimeoutBehavior::new(timeout)),
            );
        }
        if dispatch.trace_dispatch {
            pipeline.prepend(
                PipelineTier::Global,
                BehaviorEntry::instance(TracingBehavior),
            );
        }

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(Container::new()));
        let mediator = Mediator::new(self.registry, pipeline, resolver);

        if dispatch.validate_on_start {
            let orphans = mediator.validate();
            if !orphans.is_empty() {
                return Err(RuntimeError::UnhandledMessages(orphans));
            }
        }
        if dispatch.warm_up {
            let plans = mediator.warm_up()?;
            debug!(plans, "Warm-up complete");
        }

        info!(
            message_types = mediator.registry().len(),
            behaviors = mediator.pipeline().len(),
            timeout_ms = ?dispatch.default_timeout_ms,
            "Courier runtime ready"
        );

        Ok(CourierRuntime {
            config: self.config,
            mediator,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_core::{BoxError, MediatorError};
    use courier_framework::{DispatchTimeout, Handler, PostProcessor, PreProcessor};
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct Greet(String);
    courier_core::query!(Greet => String);

    struct Stall;
    courier_core::command!(Stall);

    struct Orphan;
    courier_core::command!(Orphan);

    struct Seen;
    courier_core::event!(Seen);

    struct Greeter;

    #[async_trait]
    impl Handler<Greet> for Greeter {
        async fn handle(&self, q: &Greet, _: &CancellationToken) -> Result<String, BoxError> {
            Ok(format!("hello, {}", q.0))
        }
    }

    struct Staller;

    #[async_trait]
    impl Handler<Stall> for Staller {
        async fn handle(&self, _: &Stall, token: &CancellationToken) -> Result<(), BoxError> {
            token.cancelled().await;
            Err(MediatorError::Cancelled.into())
        }
    }

    struct Audit;

    #[async_trait]
    impl PreProcessor<Orphan> for Audit {
        async fn process(&self, _: &Orphan, _: &CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct AuditSeen(Arc<AtomicUsize>);

    #[async_trait]
    impl PostProcessor<Seen> for AuditSeen {
        async fn process(&self, _: &Seen, _: &(), _: &CancellationToken) -> Result<(), BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn container() -> Arc<dyn Resolver> {
        let mut container = Container::new();
        container.register_instance(Greeter).register_instance(Staller);
        Arc::new(container)
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_query::<Greet, Greeter>()
            .unwrap()
            .register_command::<Stall, Staller>()
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_build_installs_builtins_and_warms_up() {
        let mut config = CourierConfig::default();
        config.dispatch.warm_up = true;
        config.dispatch.default_timeout_ms = Some(20);

        let runtime = CourierRuntime::builder()
            .registry(registry())
            .resolver(container())
            .config(config)
            .build()
            .unwrap();

        let mediator = runtime.mediator();
        assert_eq!(mediator.pipeline().len(), 2);
        assert_eq!(mediator.cache().len(), 2);

        let greeting = mediator.send_query(Greet("courier".into())).await.unwrap();
        assert_eq!(greeting, "hello, courier");

        let err = mediator.send_command(Stall).await.unwrap_err();
        let timeout = err.downcast_ref::<DispatchTimeout>().expect("timed out");
        assert_eq!(timeout.after, Duration::from_millis(20));
    }

    #[test]
    fn test_orphan_processors_fail_validation() {
        let mut builder = CourierRuntime::builder().resolver(container());
        builder.registry_mut().register_pre::<Orphan, Audit>().unwrap();

        match builder.build() {
            Err(RuntimeError::UnhandledMessages(names)) => {
                assert_eq!(names, [std::any::type_name::<Orphan>()]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_with_only_processors_passes_validation() {
        let audited = Arc::new(AtomicUsize::new(0));
        let mut container = Container::new();
        container.register_instance(AuditSeen(audited.clone()));

        let mut config = CourierConfig::default();
        config.dispatch.warm_up = true;
        let mut builder = CourierRuntime::builder()
            .resolver(Arc::new(container))
            .config(config);
        builder.registry_mut().register_post::<Seen, AuditSeen>().unwrap();

        let runtime = builder.build().unwrap();
        assert_eq!(runtime.mediator().cache().len(), 1);
        runtime.mediator().publish(Seen).await.unwrap();
        assert_eq!(audited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let mut config = CourierConfig::default();
        config.dispatch.validate_on_start = false;
        config.dispatch.trace_dispatch = false;

        let mut builder = CourierRuntime::builder().config(config);
        builder.registry_mut().register_pre::<Orphan, Audit>().unwrap();
        let runtime = builder.build().unwrap();
        assert!(runtime.mediator().pipeline().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CourierConfig::default();
        config.dispatch.default_timeout_ms = Some(0);
        assert!(matches!(
            CourierRuntime::builder().config(config).build(),
            Err(RuntimeError::Config(_))
        ));
    }
}
