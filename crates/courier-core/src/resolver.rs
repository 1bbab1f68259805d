//! Instance resolution for handlers and behaviors.
//!
//! The mediator never constructs handlers itself. It asks a [`Resolver`] for
//! an instance on every call, so instance lifetime (fresh per call, one per
//! logical unit of work, one per process) is entirely the resolver's concern.
//!
//! [`Container`] is a small reference resolver keyed by `TypeId`:
//!
//! ```rust,ignore
//! use courier_core::{Container, Lifetime};
//!
//! let mut container = Container::new();
//! container
//!     .register_singleton(|_| Ok(Clock::system()))
//!     .register_transient(|r| Ok(CreateUserHandler::new(r.resolve::<Clock>()?)));
//!
//! let container = Arc::new(container);
//! let scope = container.scope(); // scoped instances live as long as `scope`
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{MediatorError, MediatorResult};

/// A resolved, type-erased instance. Downcasts to `Arc<T>`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Capability used by the engine to obtain handler and behavior instances.
pub trait Resolver: Send + Sync {
    /// Produces one instance of the type identified by `type_id`.
    ///
    /// When several registrations exist the most recent one wins.
    fn resolve_any(&self, type_id: TypeId, type_name: &'static str) -> MediatorResult<Instance>;

    /// Produces every registered instance of the type, in registration order.
    fn resolve_all_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<Vec<Instance>>;
}

/// Typed helpers over any [`Resolver`].
pub trait ResolverExt {
    /// Resolves an instance of `T`.
    fn resolve<T: Send + Sync + 'static>(&self) -> MediatorResult<Arc<T>>;

    /// Resolves every registered instance of `T`.
    fn resolve_all<T: Send + Sync + 'static>(&self) -> MediatorResult<Vec<Arc<T>>>;
}

impl<R: Resolver + ?Sized> ResolverExt for R {
    fn resolve<T: Send + Sync + 'static>(&self) -> MediatorResult<Arc<T>> {
        let instance = self.resolve_any(TypeId::of::<T>(), std::any::type_name::<T>())?;
        downcast_instance::<T>(instance)
    }

    fn resolve_all<T: Send + Sync + 'static>(&self) -> MediatorResult<Vec<Arc<T>>> {
        self.resolve_all_any(TypeId::of::<T>(), std::any::type_name::<T>())?
            .into_iter()
            .map(downcast_instance::<T>)
            .collect()
    }
}

fn downcast_instance<T: Send + Sync + 'static>(instance: Instance) -> MediatorResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| MediatorError::unresolved::<T>())
}

// =============================================================================
// Container
// =============================================================================

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// A new instance for every resolution.
    Transient,
    /// One instance per [`Scope`]. The root container acts as its own scope.
    Scoped,
    /// One instance for the lifetime of the container.
    Singleton,
}

type Factory = Arc<dyn Fn(&dyn Resolver) -> MediatorResult<Instance> + Send + Sync>;

struct Registration {
    id: usize,
    type_name: &'static str,
    lifetime: Lifetime,
    factory: Factory,
    singleton: Mutex<Option<Instance>>,
}

type ScopeCache = Mutex<HashMap<usize, Instance>>;

/// A `TypeId`-keyed resolver with transient, scoped and singleton lifetimes.
///
/// Registration happens through `&mut self` before the container is shared;
/// afterwards it is read-only apart from its instance caches.
#[derive(Default)]
pub struct Container {
    registrations: HashMap<TypeId, Vec<Arc<Registration>>>,
    next_id: usize,
    root_scope: ScopeCache,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `T` with the given lifetime.
    pub fn register<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> MediatorResult<T> + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let factory: Factory = Arc::new(move |resolver: &dyn Resolver| {
            factory(resolver).map(|value| Arc::new(value) as Instance)
        });
        let registration = Registration {
            id,
            type_name: std::any::type_name::<T>(),
            lifetime,
            factory,
            singleton: Mutex::new(None),
        };

        debug!(
            type_name = registration.type_name,
            lifetime = ?lifetime,
            "Registered resolvable type"
        );
        self.registrations
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(registration));
        self
    }

    /// Registers a factory producing a new `T` for every resolution.
    pub fn register_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> MediatorResult<T> + Send + Sync + 'static,
    {
        self.register(Lifetime::Transient, factory)
    }

    /// Registers a factory producing one `T` per scope.
    pub fn register_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> MediatorResult<T> + Send + Sync + 'static,
    {
        self.register(Lifetime::Scoped, factory)
    }

    /// Registers a factory producing one `T` for the container's lifetime.
    pub fn register_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> MediatorResult<T> + Send + Sync + 'static,
    {
        self.register(Lifetime::Singleton, factory)
    }

    /// Registers an existing value as a singleton.
    pub fn register_instance<T>(&mut self, value: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        let instance: Instance = Arc::new(value);
        self.register_singleton_instance::<T>(instance)
    }

    fn register_singleton_instance<T: Send + Sync + 'static>(
        &mut self,
        instance: Instance,
    ) -> &mut Self {
        let id = self.next_id;
        self.next_id += 1;
        let shared = Arc::clone(&instance);
        let registration = Registration {
            id,
            type_name: std::any::type_name::<T>(),
            lifetime: Lifetime::Singleton,
            factory: Arc::new(move |_: &dyn Resolver| Ok(Arc::clone(&shared))),
            singleton: Mutex::new(Some(instance)),
        };
        self.registrations
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(registration));
        self
    }

    /// Returns `true` if at least one registration exists for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Opens a new scope. Scoped registrations get one instance per scope.
    pub fn scope(self: &Arc<Self>) -> Scope {
        Scope {
            root: Arc::clone(self),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn entries(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<&[Arc<Registration>]> {
        match self.registrations.get(&type_id) {
            Some(entries) if !entries.is_empty() => Ok(entries),
            _ => Err(MediatorError::UnresolvedDependency { type_name }),
        }
    }

    fn instantiate(
        registration: &Registration,
        scope: &ScopeCache,
        resolver: &dyn Resolver,
    ) -> MediatorResult<Instance> {
        trace!(
            type_name = registration.type_name,
            lifetime = ?registration.lifetime,
            "Resolving instance"
        );
        match registration.lifetime {
            Lifetime::Transient => (registration.factory)(resolver),
            Lifetime::Singleton => {
                let mut slot = registration.singleton.lock();
                if let Some(instance) = slot.as_ref() {
                    return Ok(Arc::clone(instance));
                }
                let instance = (registration.factory)(resolver)?;
                *slot = Some(Arc::clone(&instance));
                Ok(instance)
            }
            Lifetime::Scoped => {
                if let Some(instance) = scope.lock().get(&registration.id) {
                    return Ok(Arc::clone(instance));
                }
                // Built outside the lock so the factory may resolve other
                // scoped types from the same scope.
                let instance = (registration.factory)(resolver)?;
                let mut cache = scope.lock();
                let stored = cache
                    .entry(registration.id)
                    .or_insert_with(|| Arc::clone(&instance));
                Ok(Arc::clone(stored))
            }
        }
    }

    fn resolve_in(
        &self,
        scope: &ScopeCache,
        resolver: &dyn Resolver,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<Instance> {
        let entries = self.entries(type_id, type_name)?;
        let last = entries
            .last()
            .ok_or(MediatorError::UnresolvedDependency { type_name })?;
        Self::instantiate(last, scope, resolver)
    }

    fn resolve_all_in(
        &self,
        scope: &ScopeCache,
        resolver: &dyn Resolver,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<Vec<Instance>> {
        trace!(type_name, "Resolving every registration");
        match self.registrations.get(&type_id) {
            Some(entries) => entries
                .iter()
                .map(|entry| Self::instantiate(entry, scope, resolver))
                .collect(),
            None => Ok(Vec::new()),
        }
    }
}

impl Resolver for Container {
    fn resolve_any(&self, type_id: TypeId, type_name: &'static str) -> MediatorResult<Instance> {
        self.resolve_in(&self.root_scope, self, type_id, type_name)
    }

    fn resolve_all_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<Vec<Instance>> {
        self.resolve_all_in(&self.root_scope, self, type_id, type_name)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("types", &self.registrations.len())
            .field("registrations", &self.next_id)
            .finish()
    }
}

/// A resolution scope over a shared [`Container`].
///
/// Singletons are shared with the root; scoped registrations are cached for
/// as long as the `Scope` lives.
pub struct Scope {
    root: Arc<Container>,
    cache: ScopeCache,
}

impl Scope {
    /// Returns the container this scope was opened on.
    pub fn container(&self) -> &Arc<Container> {
        &self.root
    }
}

impl Resolver for Scope {
    fn resolve_any(&self, type_id: TypeId, type_name: &'static str) -> MediatorResult<Instance> {
        self.root.resolve_in(&self.cache, self, type_id, type_name)
    }

    fn resolve_all_any(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> MediatorResult<Vec<Instance>> {
        self.root.resolve_all_in(&self.cache, self, type_id, type_name)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    fn counting(lifetime: Lifetime) -> (Arc<Container>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let tally = Arc::clone(&built);
        let mut container = Container::new();
        container.register(lifetime, move |_| {
            Ok(Counter(tally.fetch_add(1, Ordering::SeqCst)))
        });
        (Arc::new(container), built)
    }

    #[test]
    fn test_transient_builds_every_time() {
        let (container, built) = counting(Lifetime::Transient);
        let a = container.resolve::<Counter>().unwrap();
        let b = container.resolve::<Counter>().unwrap();
        assert_ne!(a.0, b.0);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_shared_across_scopes() {
        let (container, built) = counting(Lifetime::Singleton);
        let a = container.resolve::<Counter>().unwrap();
        let b = container.scope().resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_instance_per_scope() {
        let (container, built) = counting(Lifetime::Scoped);
        let scope = container.scope();
        let a = scope.resolve::<Counter>().unwrap();
        let b = scope.resolve::<Counter>().unwrap();
        let c = container.scope().resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregistered_type_is_unresolved() {
        let container = Container::new();
        let err = container.resolve::<Counter>().unwrap_err();
        assert!(matches!(err, MediatorError::UnresolvedDependency { .. }));
        assert!(container.resolve_all::<Counter>().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_all_in_registration_order() {
        let mut container = Container::new();
        container
            .register_instance(Counter(1))
            .register_transient(|_| Ok(Counter(2)));
        let all = container.resolve_all::<Counter>().unwrap();
        assert_eq!(all.iter().map(|c| c.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(container.resolve::<Counter>().unwrap().0, 2);
    }

    #[test]
    fn test_factory_resolves_dependencies() {
        struct Greeter(Arc<String>);
        let mut container = Container::new();
        container
            .register_instance(String::from("hello"))
            .register_transient(|r| Ok(Greeter(r.resolve::<String>()?)));
        let greeter = container.resolve::<Greeter>().unwrap();
        assert_eq!(greeter.0.as_str(), "hello");
    }
}
