//! Pipeline behaviors and their tiered configuration.
//!
//! A [`PipelineBehavior`] wraps everything inside it, represented by a
//! [`Next`] continuation. It may inspect or replace the message, look at the
//! result, short-circuit by never calling `next`, or let failures pass
//! through untouched.
//!
//! Behaviors are registered into one of three tiers held by
//! [`PipelineConfig`]. Across tiers the order is fixed:
//!
//! ```text
//! Global ─▶ RequestShaped (commands, queries) ─▶ Kind ─▶ pre ─▶ main ─▶ post
//! ```
//!
//! Within a tier the first registered behavior is the outermost.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tower::ServiceExt;

use courier_core::{MediatorResult, MessageKind, Request, Response};

use crate::service::PipelineService;

/// A cross-cutting wrapper around the handler invocation.
///
/// # Example
///
/// ```rust,ignore
/// struct Audit;
///
/// #[async_trait]
/// impl PipelineBehavior for Audit {
///     async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response> {
///         tracing::info!(message = request.message_name(), "dispatching");
///         next.run(request).await
///     }
/// }
/// ```
#[async_trait]
pub trait PipelineBehavior: Send + Sync + 'static {
    /// Handles `request`, usually by delegating to `next`.
    async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response>;
}

/// Everything inside the current behavior.
#[derive(Clone)]
pub struct Next {
    inner: PipelineService,
}

impl Next {
    pub(crate) fn new(inner: PipelineService) -> Self {
        Self { inner }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, request: Request) -> MediatorResult<Response> {
        self.inner.oneshot(request).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

type BehaviorFactory =
    Arc<dyn Fn(&Request) -> MediatorResult<Arc<dyn PipelineBehavior>> + Send + Sync>;

/// A registered behavior: a name plus a way to obtain an instance per call.
#[derive(Clone)]
pub struct BehaviorEntry {
    name: &'static str,
    factory: BehaviorFactory,
}

impl BehaviorEntry {
    /// Resolves `B` through the request's resolver on every call, so its
    /// lifetime follows the resolver's configuration.
    pub fn resolved<B: PipelineBehavior>() -> Self {
        Self {
            name: std::any::type_name::<B>(),
            factory: Arc::new(|request: &Request| {
                let behavior: Arc<dyn PipelineBehavior> = request.resolve::<B>()?;
                Ok(behavior)
            }),
        }
    }

    /// Shares one instance across every call.
    pub fn instance<B: PipelineBehavior>(behavior: B) -> Self {
        let shared: Arc<dyn PipelineBehavior> = Arc::new(behavior);
        Self {
            name: std::any::type_name::<B>(),
            factory: Arc::new(move |_: &Request| Ok(shared.clone())),
        }
    }

    /// The behavior's type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn build(&self, request: &Request) -> MediatorResult<Arc<dyn PipelineBehavior>> {
        (self.factory)(request)
    }
}

impl fmt::Debug for BehaviorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BehaviorEntry").field(&self.name).finish()
    }
}

/// A named tier of behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineTier {
    /// Applies to every message.
    Global,
    /// Applies to commands and queries.
    RequestShaped,
    /// Applies to one message kind only.
    Kind(MessageKind),
}

impl PipelineTier {
    /// Returns `true` if the tier wraps messages of `kind`.
    pub fn applies_to(self, kind: MessageKind) -> bool {
        match self {
            Self::Global => true,
            Self::RequestShaped => kind.has_response(),
            Self::Kind(k) => k == kind,
        }
    }
}

impl fmt::Display for PipelineTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::RequestShaped => f.write_str("request-shaped"),
            Self::Kind(kind) => write!(f, "{kind}"),
        }
    }
}

/// Behavior configuration, frozen before the first dispatch.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    global: Vec<BehaviorEntry>,
    request_shaped: Vec<BehaviorEntry>,
    commands: Vec<BehaviorEntry>,
    queries: Vec<BehaviorEntry>,
    events: Vec<BehaviorEntry>,
}

impl PipelineConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry to `tier`.
    pub fn push(&mut self, tier: PipelineTier, entry: BehaviorEntry) -> &mut Self {
        self.tier_mut(tier).push(entry);
        self
    }

    /// Inserts an entry as the outermost of `tier`.
    pub fn prepend(&mut self, tier: PipelineTier, entry: BehaviorEntry) -> &mut Self {
        self.tier_mut(tier).insert(0, entry);
        self
    }

    /// Adds a resolved behavior wrapping every message.
    pub fn add_global<B: PipelineBehavior>(&mut self) -> &mut Self {
        self.push(PipelineTier::Global, BehaviorEntry::resolved::<B>())
    }

    /// Adds a shared behavior instance wrapping every message.
    pub fn add_global_instance<B: PipelineBehavior>(&mut self, behavior: B) -> &mut Self {
        self.push(PipelineTier::Global, BehaviorEntry::instance(behavior))
    }

    /// Adds a resolved behavior wrapping commands and queries.
    pub fn add_request_shaped<B: PipelineBehavior>(&mut self) -> &mut Self {
        self.push(PipelineTier::RequestShaped, BehaviorEntry::resolved::<B>())
    }

    /// Adds a shared behavior instance wrapping commands and queries.
    pub fn add_request_shaped_instance<B: PipelineBehavior>(&mut self, behavior: B) -> &mut Self {
        self.push(PipelineTier::RequestShaped, BehaviorEntry::instance(behavior))
    }

    /// Adds a resolved behavior wrapping messages of one kind.
    pub fn add_for_kind<B: PipelineBehavior>(&mut self, kind: MessageKind) -> &mut Self {
        self.push(PipelineTier::Kind(kind), BehaviorEntry::resolved::<B>())
    }

    /// Adds a shared behavior instance wrapping messages of one kind.
    pub fn add_for_kind_instance<B: PipelineBehavior>(
        &mut self,
        kind: MessageKind,
        behavior: B,
    ) -> &mut Self {
        self.push(PipelineTier::Kind(kind), BehaviorEntry::instance(behavior))
    }

    /// Entries of one tier, in registration order.
    pub fn tier(&self, tier: PipelineTier) -> &[BehaviorEntry] {
        match tier {
            PipelineTier::Global => &self.global,
            PipelineTier::RequestShaped => &self.request_shaped,
            PipelineTier::Kind(MessageKind::Command) => &self.commands,
            PipelineTier::Kind(MessageKind::Query) => &self.queries,
            PipelineTier::Kind(MessageKind::Event) => &self.events,
        }
    }

    fn tier_mut(&mut self, tier: PipelineTier) -> &mut Vec<BehaviorEntry> {
        match tier {
            PipelineTier::Global => &mut self.global,
            PipelineTier::RequestShaped => &mut self.request_shaped,
            PipelineTier::Kind(MessageKind::Command) => &mut self.commands,
            PipelineTier::Kind(MessageKind::Query) => &mut self.queries,
            PipelineTier::Kind(MessageKind::Event) => &mut self.events,
        }
    }

    /// The tiers that wrap `kind`, outermost first.
    pub fn behaviors_for(
        &self,
        kind: MessageKind,
    ) -> impl Iterator<Item = (PipelineTier, &[BehaviorEntry])> + '_ {
        [
            PipelineTier::Global,
            PipelineTier::RequestShaped,
            PipelineTier::Kind(kind),
        ]
        .into_iter()
        .filter(move |tier| tier.applies_to(kind))
        .map(move |tier| (tier, self.tier(tier)))
    }

    /// Total number of registered behaviors.
    pub fn len(&self) -> usize {
        self.global.len()
            + self.request_shaped.len()
            + self.commands.len()
            + self.queries.len()
            + self.events.len()
    }

    /// Returns `true` if no behavior is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl PipelineBehavior for Noop {
        async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response> {
            next.run(request).await
        }
    }

    struct Other;

    #[async_trait]
    impl PipelineBehavior for Other {
        async fn handle(&self, request: Request, next: Next) -> MediatorResult<Response> {
            next.run(request).await
        }
    }

    #[test]
    fn test_request_shaped_skips_events() {
        let mut config = PipelineConfig::new();
        config
            .add_global_instance(Noop)
            .add_request_shaped_instance(Noop)
            .add_for_kind_instance(MessageKind::Event, Noop);

        let tiers: Vec<_> = config
            .behaviors_for(MessageKind::Event)
            .map(|(tier, entries)| (tier, entries.len()))
            .collect();
        assert_eq!(
            tiers,
            vec![
                (PipelineTier::Global, 1),
                (PipelineTier::Kind(MessageKind::Event), 1)
            ]
        );

        let tiers: Vec<_> = config
            .behaviors_for(MessageKind::Query)
            .map(|(tier, _)| tier)
            .collect();
        assert_eq!(
            tiers,
            vec![
                PipelineTier::Global,
                PipelineTier::RequestShaped,
                PipelineTier::Kind(MessageKind::Query)
            ]
        );
    }

    #[test]
    fn test_prepend_makes_outermost() {
        let mut config = PipelineConfig::new();
        config.add_global_instance(Noop);
        config.prepend(PipelineTier::Global, BehaviorEntry::instance(Other));

        let names: Vec<_> = config
            .tier(PipelineTier::Global)
            .iter()
            .map(BehaviorEntry::name)
            .collect();
        assert!(names[0].ends_with("Other"));
        assert!(names[1].ends_with("Noop"));
        assert_eq!(config.len(), 2);
    }
}
