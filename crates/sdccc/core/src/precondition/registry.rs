//! Ordered, deduplicated precondition registry

use super::{Observing, Precondition, PreconditionContext, PreconditionError, PreconditionInstance,
    PreconditionKind, PreconditionSpec};
use crate::observer::RunObserver;
use parking_lot::RwLock;
use sdccc_types::DeviceChange;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

struct RegisteredPrecondition {
    type_id: TypeId,
    name: &'static str,
    kind: PreconditionKind,
    instance: PreconditionInstance,
}

/// Preconditions requested by the selected tests of one run
///
/// Registration order is execution order. Registering a type that is
/// already present is a no-op.
pub struct PreconditionRegistry {
    entries: RwLock<Vec<RegisteredPrecondition>>,
    executed: AtomicBool,
    observer: RunObserver,
}

impl PreconditionRegistry {
    pub fn new(observer: RunObserver) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            executed: AtomicBool::new(false),
            observer,
        }
    }

    fn is_registered(&self, type_id: TypeId) -> bool {
        self.entries.read().iter().any(|e| e.type_id == type_id)
    }

    /// Register a precondition, constructing it on first sight.
    ///
    /// Returns whether the precondition was newly added. A construction
    /// failure is returned as [`PreconditionError::Registration`] and nothing
    /// is added.
    pub fn register(&self, spec: &PreconditionSpec) -> Result<bool, PreconditionError> {
        if self.is_registered(spec.type_id) {
            debug!(precondition = spec.name, "Precondition already registered");
            return Ok(false);
        }

        let instance = (spec.construct)(&self.observer).map_err(|err| {
            error!(precondition = spec.name, error = %err, "Error while registering precondition");
            match err {
                PreconditionError::Registration { .. } => err,
                other => PreconditionError::Registration {
                    name: spec.name,
                    reason: other.to_string(),
                },
            }
        })?;

        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.type_id == spec.type_id) {
            return Ok(false);
        }
        debug!(precondition = spec.name, kind = %spec.kind, "Registered precondition");
        entries.push(RegisteredPrecondition {
            type_id: spec.type_id,
            name: spec.name,
            kind: spec.kind,
            instance,
        });
        Ok(true)
    }

    /// Run every registered precondition once, in registration order.
    ///
    /// The first error stops the remaining preconditions. Storage is
    /// flushed after each precondition so the next one sees current data.
    #[instrument(skip_all)]
    pub async fn run_all(&self, ctx: &PreconditionContext) -> Result<(), PreconditionError> {
        if self.executed.swap(true, Ordering::SeqCst) {
            return Err(PreconditionError::AlreadyExecuted);
        }

        let preconditions: Vec<(&'static str, Arc<dyn Precondition>)> = self
            .entries
            .read()
            .iter()
            .map(|e| (e.name, e.instance.precondition.clone()))
            .collect();

        for (name, precondition) in preconditions {
            info!("Running precondition {}", name);
            let result = if precondition.handles_own_locking() {
                precondition.verify(ctx).await
            } else {
                ctx.locker.lock(name, precondition.verify(ctx)).await
            };
            if let Err(err) = result {
                warn!(precondition = name, error = %err, "Precondition failed");
                return Err(err);
            }
            ctx.storage.flush().await;
        }
        Ok(())
    }

    /// Registered preconditions with the observing capability
    pub fn observing_preconditions(&self) -> Vec<Arc<dyn Observing>> {
        self.entries
            .read()
            .iter()
            .filter_map(|e| e.instance.observing.clone())
            .collect()
    }

    /// Forward a device change to every observing precondition
    pub fn dispatch_change(&self, change: &DeviceChange) {
        for observing in self.observing_preconditions() {
            observing.observe_change(change);
        }
    }

    /// Typed access to a registered precondition
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let any = self
            .entries
            .read()
            .iter()
            .find(|e| e.type_id == TypeId::of::<T>())
            .map(|e| e.instance.any.clone())?;
        any.downcast::<T>().ok()
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.is_registered(TypeId::of::<T>())
    }

    /// Names and kinds in registration order
    pub fn names(&self) -> Vec<(&'static str, PreconditionKind)> {
        self.entries.read().iter().map(|e| (e.name, e.kind)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
