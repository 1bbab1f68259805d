//! Per-type cache of dispatch plans.
//!
//! Keys are `(TypeId, MessageKind)`. Reads on a known key take a shard read
//! lock and clone an `Arc`. On a miss the plan is built inside
//! `entry().or_try_insert_with`, which holds the shard write lock, so
//! concurrent first uses of a type build exactly one plan and every caller
//! observes the same instance. A failed build leaves no entry behind.
//!
//! Entries are never evicted.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::trace;

use courier_core::{MediatorResult, MessageKind};

use crate::composer::DispatchPlan;

/// Concurrency-safe map from message type to its compiled plan.
#[derive(Default)]
pub struct DispatcherCache {
    plans: DashMap<(TypeId, MessageKind), Arc<DispatchPlan>>,
    built: AtomicUsize,
}

impl DispatcherCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plan, building it with `build` on first use.
    pub fn get_or_build<F>(
        &self,
        message_type: TypeId,
        kind: MessageKind,
        build: F,
    ) -> MediatorResult<Arc<DispatchPlan>>
    where
        F: FnOnce() -> MediatorResult<DispatchPlan>,
    {
        let key = (message_type, kind);
        if let Some(plan) = self.plans.get(&key) {
            return Ok(Arc::clone(plan.value()));
        }

        let plan = self.plans.entry(key).or_try_insert_with(|| {
            let plan = build()?;
            self.built.fetch_add(1, Ordering::Relaxed);
            trace!(message_type = plan.message_name(), kind = %kind, "Cached dispatch plan");
            Ok(Arc::new(plan))
        })?;
        Ok(Arc::clone(plan.value()))
    }

    /// Returns the cached plan without building it.
    pub fn get(&self, message_type: TypeId, kind: MessageKind) -> Option<Arc<DispatchPlan>> {
        self.plans
            .get(&(message_type, kind))
            .map(|plan| Arc::clone(plan.value()))
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Returns `true` if no plan has been built yet.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Total number of plans built since creation.
    pub fn plans_built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for DispatcherCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherCache")
            .field("plans", &self.plans.len())
            .field("built", &self.plans_built())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::PipelineConfig;
    use crate::composer::PipelineComposer;
    use crate::registry::HandlerRegistry;
    use courier_core::MediatorError;

    struct Tick;

    fn build(kind: MessageKind) -> MediatorResult<DispatchPlan> {
        PipelineComposer::new(&HandlerRegistry::new(), &PipelineConfig::new()).compose(
            TypeId::of::<Tick>(),
            "Tick",
            kind,
        )
    }

    #[test]
    fn test_plan_is_built_once() {
        let cache = DispatcherCache::new();
        let first = cache
            .get_or_build(TypeId::of::<Tick>(), MessageKind::Event, || build(MessageKind::Event))
            .unwrap();
        let second = cache
            .get_or_build(TypeId::of::<Tick>(), MessageKind::Event, || {
                panic!("plan must come from the cache")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.plans_built(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = DispatcherCache::new();
        for _ in 0..2 {
            let err = cache
                .get_or_build(TypeId::of::<Tick>(), MessageKind::Command, || {
                    build(MessageKind::Command)
                })
                .unwrap_err();
            assert!(matches!(err, MediatorError::HandlerNotFound { .. }));
        }
        assert!(cache.is_empty());
        assert_eq!(cache.plans_built(), 0);
        assert!(cache.get(TypeId::of::<Tick>(), MessageKind::Command).is_none());
    }
}
