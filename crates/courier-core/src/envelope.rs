//! Type-erased request and response envelopes.
//!
//! A dispatch plan is compiled once per message type but behaviors are
//! shared across all types, so the chain between them carries the message
//! as `dyn Any`. Typed access is a `TypeId` downcast; no reflection happens
//! at call time.
//!
//! [`Request`] is cheap to clone: the message lives behind an `Arc`, which
//! lets post-processors look at it again after the Main handler returned.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{MediatorError, MediatorResult};
use crate::message::{Message, MessageKind};
use crate::resolver::{Resolver, ResolverExt};

/// The envelope handed to every stage of a dispatch plan.
#[derive(Clone)]
pub struct Request {
    message: Arc<dyn Any + Send + Sync>,
    message_type: TypeId,
    message_name: &'static str,
    kind: MessageKind,
    resolver: Arc<dyn Resolver>,
    token: CancellationToken,
}

impl Request {
    /// Wraps `message` for dispatch as `kind`.
    pub fn new<M: Message>(
        message: M,
        kind: MessageKind,
        resolver: Arc<dyn Resolver>,
        token: CancellationToken,
    ) -> Self {
        Self {
            message: Arc::new(message),
            message_type: TypeId::of::<M>(),
            message_name: std::any::type_name::<M>(),
            kind,
            resolver,
            token,
        }
    }

    /// Returns the runtime type of the carried message.
    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    /// Returns the type name of the carried message.
    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    /// Returns the kind the message is dispatched as.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns `true` if the envelope carries an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.message_type == TypeId::of::<M>()
    }

    /// Borrows the message as `M`, if that is what it is.
    pub fn message<M: Message>(&self) -> Option<&M> {
        self.message.downcast_ref::<M>()
    }

    /// Borrows the message as `M`, failing with a type mismatch otherwise.
    pub fn downcast_message<M: Message>(&self) -> MediatorResult<&M> {
        self.message::<M>()
            .ok_or(MediatorError::MessageTypeMismatch {
                expected: std::any::type_name::<M>(),
                found: self.message_name,
            })
    }

    /// Replaces the carried message.
    ///
    /// Behaviors use this to transform a message before passing it on. The
    /// replacement must be of the same type; inner stages downcast to it.
    pub fn replace_message<M: Message>(&mut self, message: M) -> MediatorResult<()> {
        if !self.is::<M>() {
            return Err(MediatorError::MessageTypeMismatch {
                expected: self.message_name,
                found: std::any::type_name::<M>(),
            });
        }
        self.message = Arc::new(message);
        Ok(())
    }

    /// Returns the resolver for this call.
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Resolves an instance of `T` through this call's resolver.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> MediatorResult<Arc<T>> {
        self.resolver.resolve::<T>()
    }

    /// Returns the cancellation token for this call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Swaps in a different cancellation token for inner stages.
    pub fn set_token(&mut self, token: CancellationToken) {
        self.token = token;
    }

    /// Fails with [`MediatorError::Cancelled`] once the token has fired.
    pub fn ensure_active(&self) -> MediatorResult<()> {
        if self.token.is_cancelled() {
            Err(MediatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("message", &self.message_name)
            .field("kind", &self.kind)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The type-erased value produced by a dispatch plan.
pub struct Response(Box<dyn Any + Send + Sync>);

impl Response {
    /// Boxes `value` as a response.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// The response of an event publish.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Returns `true` if the response holds a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Borrows the response as `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Unwraps the response as `T`.
    pub fn downcast<T: 'static>(self) -> MediatorResult<T> {
        self.0
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| MediatorError::ResponseTypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Container;

    #[derive(Debug, PartialEq)]
    struct Rename(String);
    crate::command!(Rename);

    struct Other;
    crate::command!(Other);

    fn request() -> Request {
        Request::new(
            Rename("a".into()),
            MessageKind::Command,
            Arc::new(Container::new()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_typed_access() {
        let req = request();
        assert!(req.is::<Rename>());
        assert_eq!(req.message::<Rename>(), Some(&Rename("a".into())));
        assert!(req.message::<Other>().is_none());
        assert!(matches!(
            req.downcast_message::<Other>(),
            Err(MediatorError::MessageTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_replace_message_keeps_type() {
        let mut req = request();
        let snapshot = req.clone();
        req.replace_message(Rename("b".into())).unwrap();
        assert_eq!(req.message::<Rename>(), Some(&Rename("b".into())));
        assert_eq!(snapshot.message::<Rename>(), Some(&Rename("a".into())));
        assert!(req.replace_message(Other).is_err());
    }

    #[test]
    fn test_ensure_active_observes_token() {
        let req = request();
        assert!(req.ensure_active().is_ok());
        req.token().cancel();
        assert!(req.ensure_active().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_response_downcast() {
        let res = Response::new(7_i64);
        assert_eq!(res.downcast_ref::<i64>(), Some(&7));
        assert!(matches!(
            Response::unit().downcast::<i64>(),
            Err(MediatorError::ResponseTypeMismatch { .. })
        ));
        assert_eq!(Response::new(7_i64).downcast::<i64>().unwrap(), 7);
    }
}
