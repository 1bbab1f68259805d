//! Handler registry.
//!
//! The registry maps a message type to the handlers declared for it, tagged
//! by [`HandlerRole`]. It is filled once at startup and handed to the
//! [`Mediator`](crate::Mediator), after which it is never mutated.
//!
//! Registration is typed: each call records a [`HandlerDescriptor`] and a
//! monomorphic invoker that resolves the handler through the per-call
//! resolver, downcasts the message and calls the handler. Nothing about the
//! handler type has to be rediscovered at dispatch time.
//!
//! Pre- and post-processors (and event handlers) are kept as sequences:
//! registering the same processor twice makes it run twice, and
//! registration order is execution order.
//!
//! ```rust,ignore
//! let mut registry = HandlerRegistry::new();
//! registry
//!     .register_command::<Increment, IncrementHandler>()?
//!     .register_pre::<Increment, AuditTrail>()?
//!     .register_event::<TotalChanged, Notifier>()?;
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;
use tracing::debug;

use courier_core::{
    Command, Event, MediatorError, MediatorResult, Message, MessageKind, Query, Request, Response,
};

use crate::handler::{Handler, PostProcessor, PreProcessor};

pub(crate) type MainFn = for<'a> fn(&'a Request) -> BoxFuture<'a, MediatorResult<Response>>;
pub(crate) type PreFn = for<'a> fn(&'a Request) -> BoxFuture<'a, MediatorResult<()>>;
pub(crate) type PostFn =
    for<'a> fn(&'a Request, &'a Response) -> BoxFuture<'a, MediatorResult<()>>;

/// The role a handler plays for its message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    /// Performs the business logic.
    Main,
    /// Runs before the Main handler(s).
    Pre,
    /// Runs after the Main handler(s) succeeded.
    Post,
}

/// Describes one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Runtime type of the message.
    pub message_type: TypeId,
    /// Name of the message type.
    pub message_name: &'static str,
    /// Runtime type of the handler.
    pub handler_type: TypeId,
    /// Name of the handler type.
    pub handler_name: &'static str,
    /// Role of the handler.
    pub role: HandlerRole,
}

impl HandlerDescriptor {
    fn of<M: 'static, H: 'static>(role: HandlerRole) -> Self {
        Self {
            message_type: TypeId::of::<M>(),
            message_name: std::any::type_name::<M>(),
            handler_type: TypeId::of::<H>(),
            handler_name: std::any::type_name::<H>(),
            role,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Entry<F> {
    pub(crate) descriptor: HandlerDescriptor,
    pub(crate) invoke: F,
}

/// Everything registered for one message type.
pub struct Registration {
    message_name: &'static str,
    kind: MessageKind,
    pub(crate) main: Vec<Entry<MainFn>>,
    pub(crate) pre: Vec<Entry<PreFn>>,
    pub(crate) post: Vec<Entry<PostFn>>,
}

impl Registration {
    fn new(message_name: &'static str, kind: MessageKind) -> Self {
        Self {
            message_name,
            kind,
            main: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Name of the message type.
    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    /// The kind the message type is dispatched as.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns `true` if a dispatch plan can be built for this type: it has
    /// a Main handler, or it is an event (zero handlers is a no-op).
    pub fn is_dispatchable(&self) -> bool {
        !self.main.is_empty() || !self.kind.requires_single_handler()
    }

    /// Main handlers, in registration order.
    pub fn main_handlers(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.main.iter().map(|e| &e.descriptor)
    }

    /// Pre-processors, in registration order.
    pub fn pre_processors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.pre.iter().map(|e| &e.descriptor)
    }

    /// Post-processors, in registration order.
    pub fn post_processors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.post.iter().map(|e| &e.descriptor)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("message", &self.message_name)
            .field("kind", &self.kind)
            .field("main", &self.main.len())
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .finish()
    }
}

/// Lookup table from message type to its registered handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: HashMap<TypeId, Registration>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the Main handler of a command.
    ///
    /// Fails with [`MediatorError::AmbiguousHandler`] if `C` already has one.
    pub fn register_command<C, H>(&mut self) -> MediatorResult<&mut Self>
    where
        C: Command,
        H: Handler<C>,
    {
        self.register_main::<C, H>(MessageKind::Command)
    }

    /// Registers the Main handler of a query.
    ///
    /// Fails with [`MediatorError::AmbiguousHandler`] if `Q` already has one.
    pub fn register_query<Q, H>(&mut self) -> MediatorResult<&mut Self>
    where
        Q: Query,
        H: Handler<Q>,
    {
        self.register_main::<Q, H>(MessageKind::Query)
    }

    /// Adds a Main handler for an event. Any number may be registered.
    pub fn register_event<E, H>(&mut self) -> MediatorResult<&mut Self>
    where
        E: Event,
        H: Handler<E>,
    {
        self.register_main::<E, H>(MessageKind::Event)
    }

    /// Appends a pre-processor for `M`.
    pub fn register_pre<M, P>(&mut self) -> MediatorResult<&mut Self>
    where
        M: Message,
        P: PreProcessor<M>,
    {
        let descriptor = HandlerDescriptor::of::<M, P>(HandlerRole::Pre);
        debug!(
            message_type = descriptor.message_name,
            handler = descriptor.handler_name,
            "Registered pre-processor"
        );
        self.entry::<M>().pre.push(Entry {
            descriptor,
            invoke: invoke_pre::<M, P>,
        });
        Ok(self)
    }

    /// Appends a post-processor for `M`.
    pub fn register_post<M, P>(&mut self) -> MediatorResult<&mut Self>
    where
        M: Message,
        P: PostProcessor<M>,
    {
        let descriptor = HandlerDescriptor::of::<M, P>(HandlerRole::Post);
        debug!(
            message_type = descriptor.message_name,
            handler = descriptor.handler_name,
            "Registered post-processor"
        );
        self.entry::<M>().post.push(Entry {
            descriptor,
            invoke: invoke_post::<M, P>,
        });
        Ok(self)
    }

    fn register_main<M, H>(&mut self, kind: MessageKind) -> MediatorResult<&mut Self>
    where
        M: Message,
        H: Handler<M>,
    {
        let descriptor = HandlerDescriptor::of::<M, H>(HandlerRole::Main);
        let entry = self.entry::<M>();

        if entry.kind != kind {
            return Err(MediatorError::KindConflict {
                message: descriptor.message_name,
                registered: entry.kind,
                requested: kind,
            });
        }
        if kind.requires_single_handler() {
            if let Some(existing) = entry.main.first() {
                return Err(MediatorError::AmbiguousHandler {
                    message: descriptor.message_name,
                    existing: existing.descriptor.handler_name,
                    rejected: descriptor.handler_name,
                });
            }
        }

        entry.main.push(Entry {
            descriptor,
            invoke: invoke_main::<M, H>,
        });
        debug!(
            message_type = descriptor.message_name,
            handler = descriptor.handler_name,
            kind = %kind,
            "Registered handler"
        );
        Ok(self)
    }

    fn entry<M: Message>(&mut self) -> &mut Registration {
        self.entries
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Registration::new(std::any::type_name::<M>(), M::KIND))
    }

    /// Returns the registration for a message type.
    pub fn lookup(&self, message_type: TypeId) -> Option<&Registration> {
        self.entries.get(&message_type)
    }

    /// Returns the registration for `M`.
    pub fn lookup_for<M: Message>(&self) -> Option<&Registration> {
        self.lookup(TypeId::of::<M>())
    }

    /// Iterates every descriptor in the registry.
    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.entries.values().flat_map(|r| {
            r.pre_processors()
                .chain(r.main_handlers())
                .chain(r.post_processors())
        })
    }

    /// Message types whose dispatch plan can be built, with their kind.
    pub fn message_types(&self) -> impl Iterator<Item = (TypeId, &'static str, MessageKind)> + '_ {
        self.entries
            .iter()
            .filter(|(_, r)| r.is_dispatchable())
            .map(|(id, r)| (*id, r.message_name, r.kind))
    }

    /// Names of commands and queries that have pre/post-processors but no
    /// Main handler. Sending them will fail. Events are never reported.
    pub fn orphans(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .entries
            .values()
            .filter(|r| !r.is_dispatchable())
            .map(|r| r.message_name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of message types with at least one registration.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.entries.len())
            .finish()
    }
}

// =============================================================================
// Invokers
// =============================================================================

fn invoke_main<M, H>(request: &Request) -> BoxFuture<'_, MediatorResult<Response>>
where
    M: Message,
    H: Handler<M>,
{
    Box::pin(async move {
        let handler = request.resolve::<H>()?;
        let message = request.downcast_message::<M>()?;
        let response = handler
            .handle(message, request.token())
            .await
            .map_err(MediatorError::from_boxed)?;
        Ok(Response::new(response))
    })
}

fn invoke_pre<M, P>(request: &Request) -> BoxFuture<'_, MediatorResult<()>>
where
    M: Message,
    P: PreProcessor<M>,
{
    Box::pin(async move {
        let processor = request.resolve::<P>()?;
        let message = request.downcast_message::<M>()?;
        processor
            .process(message, request.token())
            .await
            .map_err(MediatorError::from_boxed)
    })
}

fn invoke_post<'a, M, P>(
    request: &'a Request,
    response: &'a Response,
) -> BoxFuture<'a, MediatorResult<()>>
where
    M: Message,
    P: PostProcessor<M>,
{
    Box::pin(async move {
        let processor = request.resolve::<P>()?;
        let message = request.downcast_message::<M>()?;
        let response =
            response
                .downcast_ref::<M::Response>()
                .ok_or(MediatorError::ResponseTypeMismatch {
                    expected: std::any::type_name::<M::Response>(),
                })?;
        processor
            .process(message, response, request.token())
            .await
            .map_err(MediatorError::from_boxed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::BoxError;
    use tokio_util::sync::CancellationToken;

    struct Increment(i64);
    courier_core::command!(Increment => i64);

    struct Ping;
    courier_core::event!(Ping);

    struct Inc;
    #[async_trait]
    impl Handler<Increment> for Inc {
        async fn handle(&self, m: &Increment, _: &CancellationToken) -> Result<i64, BoxError> {
            Ok(m.0 + 1)
        }
    }

    struct OtherInc;
    #[async_trait]
    impl Handler<Increment> for OtherInc {
        async fn handle(&self, m: &Increment, _: &CancellationToken) -> Result<i64, BoxError> {
            Ok(m.0 + 2)
        }
    }

    struct Pong;
    #[async_trait]
    impl Handler<Ping> for Pong {
        async fn handle(&self, _: &Ping, _: &CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Audit;
    #[async_trait]
    impl PreProcessor<Increment> for Audit {
        async fn process(&self, _: &Increment, _: &CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Seen;
    #[async_trait]
    impl PostProcessor<Ping> for Seen {
        async fn process(&self, _: &Ping, _: &(), _: &CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_second_command_handler_is_ambiguous() {
        let mut registry = HandlerRegistry::new();
        registry.register_command::<Increment, Inc>().unwrap();
        let err = registry
            .register_command::<Increment, OtherInc>()
            .err()
            .expect("second handler must be rejected");
        assert!(matches!(err, MediatorError::AmbiguousHandler { .. }));
        assert_eq!(registry.lookup_for::<Increment>().unwrap().main.len(), 1);
    }

    #[test]
    fn test_events_accept_many_handlers() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_event::<Ping, Pong>()
            .unwrap()
            .register_event::<Ping, Pong>()
            .unwrap();
        let reg = registry.lookup_for::<Ping>().unwrap();
        assert_eq!(reg.kind(), MessageKind::Event);
        assert_eq!(reg.main_handlers().count(), 2);
    }

    #[test]
    fn test_processors_keep_duplicates_in_order() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_pre::<Increment, Audit>()
            .unwrap()
            .register_pre::<Increment, Audit>()
            .unwrap();
        let reg = registry.lookup_for::<Increment>().unwrap();
        assert_eq!(reg.pre_processors().count(), 2);
        assert!(reg.pre_processors().all(|d| d.role == HandlerRole::Pre));
        assert_eq!(registry.orphans().len(), 1);

        registry.register_command::<Increment, Inc>().unwrap();
        assert!(registry.orphans().is_empty());
        assert_eq!(registry.descriptors().count(), 3);
    }

    #[test]
    fn test_missing_main_handler_is_not_a_registration_error() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.register_pre::<Increment, Audit>().is_ok());
        assert_eq!(registry.message_types().count(), 0);
        assert_eq!(
            registry.lookup_for::<Increment>().unwrap().kind(),
            MessageKind::Command
        );
    }

    #[test]
    fn test_event_with_only_processors_is_dispatchable() {
        let mut registry = HandlerRegistry::new();
        registry.register_post::<Ping, Seen>().unwrap();

        let reg = registry.lookup_for::<Ping>().unwrap();
        assert_eq!(reg.kind(), MessageKind::Event);
        assert!(reg.is_dispatchable());
        assert!(registry.orphans().is_empty());
        assert_eq!(registry.message_types().count(), 1);

        registry.register_event::<Ping, Pong>().unwrap();
        assert_eq!(registry.lookup_for::<Ping>().unwrap().main_handlers().count(), 1);
    }
}
