//! # Courier Framework
//!
//! The dispatch engine of the Courier mediator.
//!
//! This layer provides:
//! - Handler traits for Main handlers, pre-processors and post-processors
//! - The [`HandlerRegistry`] filled at startup
//! - Pipeline behaviors organised in global, request-shaped and per-kind tiers
//! - The [`PipelineComposer`] and [`DispatcherCache`] that build and keep one
//!   [`DispatchPlan`] per message type
//! - The [`Mediator`] entry points and their narrow capability traits
//! - Built-in tracing and timeout behaviors
//!
//! Plans are tower services: every behavior, processor stage and handler is a
//! `tower::Service<Request>` stacked through [`tower::Layer`]s.

pub mod behavior;
pub mod builtin;
pub mod cache;
pub mod composer;
pub mod handler;
pub mod mediator;
pub mod registry;
pub mod service;

pub use behavior::{BehaviorEntry, Next, PipelineBehavior, PipelineConfig, PipelineTier};
pub use builtin::{DispatchTimeout, TimeoutBehavior, TracingBehavior};
pub use cache::DispatcherCache;
pub use composer::{DispatchPlan, PipelineComposer};
pub use handler::{Handler, PostProcessor, PreProcessor};
pub use mediator::{CommandSender, EventPublisher, Mediator, QuerySender};
pub use registry::{HandlerDescriptor, HandlerRegistry, HandlerRole, Registration};
pub use service::{
    BehaviorLayer, BehaviorService, BroadcastService, MainHandlerService, PipelineService,
    PostProcessLayer, PostProcessService, PreProcessLayer, PreProcessService,
};

pub use async_trait::async_trait;
