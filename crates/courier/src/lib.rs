//! # Courier
//!
//! An in-process mediator: callers send typed commands and queries and
//! publish events without knowing which handler serves them or how it is
//! constructed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌──────────────────┐     ┌────────────────────────────┐
//! │  caller  │────▶│ Mediator │────▶│ DispatcherCache  │────▶│ DispatchPlan (tower stack) │
//! └──────────┘     └──────────┘     │  one plan / type │     │ global ▸ request ▸ kind    │
//!                                   └──────────────────┘     │ ▸ pre ▸ handler(s) ▸ post  │
//!                                                            └────────────────────────────┘
//! ```
//!
//! - **Messages**: `Command` (one handler), `Query` (one handler, a result),
//!   `Event` (zero or more handlers)
//! - **Handlers**: Main handlers plus pre- and post-processors per message type
//! - **Behaviors**: cross-cutting wrappers in global, request-shaped and
//!   per-kind tiers
//! - **Plans**: composed once per message type on first use and cached
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! struct Increment { n: i64 }
//! command!(Increment => i64);
//!
//! struct IncrementHandler;
//!
//! #[async_trait]
//! impl Handler<Increment> for IncrementHandler {
//!     async fn handle(&self, cmd: &Increment, _: &CancellationToken) -> Result<i64, BoxError> {
//!         Ok(cmd.n + 1)
//!     }
//! }
//!
//! let mut container = Container::new();
//! container.register_transient(|_: &dyn Resolver| Ok(IncrementHandler));
//!
//! let mut builder = CourierRuntime::builder().resolver(std::sync::Arc::new(container));
//! builder.registry_mut().register_command::<Increment, IncrementHandler>()?;
//! let runtime = builder.build()?;
//!
//! assert_eq!(runtime.mediator().send_command(Increment { n: 5 }).await?, 6);
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `courier.toml` configuration files (default)
//! - `yaml-config`: `courier.yaml` configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

pub use courier_core::{command, event, query};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime};

    // Messages
    pub use courier_core::{Command, Event, Message, MessageKind, Query};
    pub use courier_core::{command, event, query};

    // Handlers and behaviors
    pub use courier_framework::{
        Handler, HandlerRegistry, Next, PipelineBehavior, PipelineConfig, PostProcessor,
        PreProcessor, async_trait,
    };

    // Dispatch
    pub use courier_framework::{CommandSender, EventPublisher, Mediator, QuerySender};

    // Resolution
    pub use courier_core::{Container, Resolver, ResolverExt};

    // Errors and envelopes
    pub use courier_core::{
        BoxError, CancellationToken, MediatorError, MediatorResult, Request, Response,
    };
}
