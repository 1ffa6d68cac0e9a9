//! Preconditions
//!
//! A precondition brings the DUT into a state some invariant tests need
//! before the connection is closed. Three variants exist:
//! - Simple: a check, followed by a manipulation only if the check fails
//! - Manipulation: a manipulation that always runs
//! - Observing: receives every device change while connected
//!
//! Preconditions are declared by type through [`PreconditionSpec`] and
//! deduplicated by type identity in the [`PreconditionRegistry`].

mod buffered;
mod locker;
mod registry;

pub use buffered::{BufferedObserver, ChangeProcessor, QUEUE_WARNING_THRESHOLD};
pub use locker::ManipulationLocker;
pub use registry::PreconditionRegistry;

use crate::client::{ClientError, Manipulations, TestClient};
use crate::observer::RunObserver;
use crate::storage::{MessageStorage, StorageError};
use async_trait::async_trait;
use sdccc_types::DeviceChange;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Precondition errors
#[derive(Debug, Error)]
pub enum PreconditionError {
    /// Construction failed while registering
    #[error("Error while registering precondition {name}: {reason}")]
    Registration { name: &'static str, reason: String },

    /// Check could not be evaluated
    #[error("Check of precondition {name} failed: {reason}")]
    Check { name: &'static str, reason: String },

    /// Manipulation raised an error
    #[error("Manipulation of precondition {name} failed: {reason}")]
    Manipulation { name: &'static str, reason: String },

    /// `run_all` was called a second time
    #[error("Preconditions were already executed for this run")]
    AlreadyExecuted,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything a precondition may use while verifying
#[derive(Clone)]
pub struct PreconditionContext {
    pub client: Arc<dyn TestClient>,
    pub storage: Arc<dyn MessageStorage>,
    pub manipulations: Arc<dyn Manipulations>,
    pub locker: ManipulationLocker,
    pub observer: RunObserver,
}

/// Executable form of every precondition variant
#[async_trait]
pub trait Precondition: Send + Sync {
    async fn verify(&self, ctx: &PreconditionContext) -> Result<(), PreconditionError>;

    /// Whether this precondition takes the manipulation lock itself
    fn handles_own_locking(&self) -> bool {
        false
    }
}

/// Check followed by an optional manipulation
#[async_trait]
pub trait SimplePrecondition: Send + Sync + 'static {
    /// Returns true if the DUT already satisfies the precondition
    async fn check(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError>;

    /// Returns true if the manipulation succeeded
    async fn manipulation(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError>;
}

/// Manipulation that runs unconditionally
#[async_trait]
pub trait ManipulationPrecondition: Send + Sync + 'static {
    /// Returns true if the manipulation succeeded
    async fn manipulation(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError>;
}

/// Receives device changes while connected
pub trait Observing: Send + Sync {
    fn observe_change(&self, change: &DeviceChange);
}

/// Precondition variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionKind {
    Simple,
    Manipulation,
    Observing,
}

impl fmt::Display for PreconditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreconditionKind::Simple => "simple",
            PreconditionKind::Manipulation => "manipulation",
            PreconditionKind::Observing => "observing",
        };
        f.write_str(name)
    }
}

/// A constructed precondition with its capability views
#[derive(Clone)]
pub struct PreconditionInstance {
    pub(crate) precondition: Arc<dyn Precondition>,
    pub(crate) observing: Option<Arc<dyn Observing>>,
    pub(crate) any: Arc<dyn Any + Send + Sync>,
}

type Constructor =
    Arc<dyn Fn(&RunObserver) -> Result<PreconditionInstance, PreconditionError> + Send + Sync>;

/// Declaration of a precondition by type
#[derive(Clone)]
pub struct PreconditionSpec {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) kind: PreconditionKind,
    pub(crate) construct: Constructor,
}

impl fmt::Debug for PreconditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreconditionSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PreconditionSpec {
    pub fn simple<T: SimplePrecondition + Default>() -> Self {
        Self::simple_with::<T, _>(|_| Ok(T::default()))
    }

    pub fn simple_with<T, F>(construct: F) -> Self
    where
        T: SimplePrecondition,
        F: Fn(&RunObserver) -> Result<T, PreconditionError> + Send + Sync + 'static,
    {
        let name = short_type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            name,
            kind: PreconditionKind::Simple,
            construct: Arc::new(move |observer: &RunObserver| {
                let inner = Arc::new(construct(observer)?);
                Ok(PreconditionInstance {
                    precondition: Arc::new(SimpleAdapter {
                        name,
                        inner: inner.clone(),
                    }),
                    observing: None,
                    any: inner,
                })
            }),
        }
    }

    pub fn manipulation<T: ManipulationPrecondition + Default>() -> Self {
        Self::manipulation_with::<T, _>(|_| Ok(T::default()))
    }

    pub fn manipulation_with<T, F>(construct: F) -> Self
    where
        T: ManipulationPrecondition,
        F: Fn(&RunObserver) -> Result<T, PreconditionError> + Send + Sync + 'static,
    {
        let name = short_type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            name,
            kind: PreconditionKind::Manipulation,
            construct: Arc::new(move |observer: &RunObserver| {
                let inner = Arc::new(construct(observer)?);
                Ok(PreconditionInstance {
                    precondition: Arc::new(ManipulationAdapter {
                        name,
                        inner: inner.clone(),
                    }),
                    observing: None,
                    any: inner,
                })
            }),
        }
    }

    pub fn observing_with<T, F>(construct: F) -> Self
    where
        T: Precondition + Observing + 'static,
        F: Fn(&RunObserver) -> Result<T, PreconditionError> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            kind: PreconditionKind::Observing,
            construct: Arc::new(move |observer: &RunObserver| {
                let inner = Arc::new(construct(observer)?);
                Ok(PreconditionInstance {
                    precondition: inner.clone(),
                    observing: Some(inner.clone()),
                    any: inner,
                })
            }),
        }
    }

    /// Observing precondition processing changes off the caller's task
    pub fn buffered<P: ChangeProcessor + Default>() -> Self {
        let name = short_type_name::<P>();
        let mut spec = Self::observing_with::<BufferedObserver<P>, _>(move |observer| {
            Ok(BufferedObserver::new(name, P::default(), observer.clone()))
        });
        spec.name = name;
        spec
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PreconditionKind {
        self.kind
    }
}

struct SimpleAdapter<T> {
    name: &'static str,
    inner: Arc<T>,
}

#[async_trait]
impl<T: SimplePrecondition> Precondition for SimpleAdapter<T> {
    async fn verify(&self, ctx: &PreconditionContext) -> Result<(), PreconditionError> {
        if self.inner.check(ctx).await? {
            info!(precondition = self.name, "Precondition already met");
            return Ok(());
        }
        info!(precondition = self.name, "Precondition not met, running manipulation");
        if !self.inner.manipulation(ctx).await? {
            warn!(precondition = self.name, "Manipulation for precondition was not successful");
        }
        Ok(())
    }
}

struct ManipulationAdapter<T> {
    name: &'static str,
    inner: Arc<T>,
}

#[async_trait]
impl<T: ManipulationPrecondition> Precondition for ManipulationAdapter<T> {
    async fn verify(&self, ctx: &PreconditionContext) -> Result<(), PreconditionError> {
        if !self.inner.manipulation(ctx).await? {
            warn!(precondition = self.name, "Manipulation precondition was not successful");
        }
        Ok(())
    }
}

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
