//! Thin façade over the active-message substrate the containers run on.
//!
//! The container core never talks to a transport directly; it consumes the
//! [`Communicator`] trait, which models an SPMD world of `size()` ranks with
//! reliable, per-channel-ordered, fire-and-forget active messages plus the
//! handful of collectives the rebalance phase needs. Two in-process backends
//! ship with the crate: [`SerialComm`] for single-rank unit tests and
//! doctests, and [`ThreadComm`] which runs one rank per thread.
//!
//! An active message is an [`Envelope`]: handler code and its captured
//! arguments boxed together, executed at the destination rank. Envelopes name
//! their target container by [`ContainerId`], resolved at the destination
//! through that rank's [`Registry`]. Registration is collective and
//! same-order on every rank, so one id denotes "the same" container
//! everywhere; the capability a remote handler holds is this id, never an
//! aliasable pointer into another rank's state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DistArrayError;

mod serial;
mod thread;

pub use serial::SerialComm;
pub use thread::ThreadComm;

/// One active message: a handler plus captured arguments, executed at the
/// destination rank against that rank's container registry.
pub type Envelope = Box<dyn FnOnce(&Registry) + Send + 'static>;

/// Location-independent name for a registered container.
///
/// Ids are assigned in registration order. All ranks must register their
/// containers in the same order (a collective-construction precondition, not
/// independently verified), which makes the id meaningful on every rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

impl ContainerId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-rank slot table mapping [`ContainerId`]s to container shards.
///
/// Envelopes receive a reference to the destination rank's registry when they
/// execute and downcast their slot back to the concrete shard type.
#[derive(Default)]
pub struct Registry {
    slots: Mutex<Vec<Arc<dyn Any + Send + Sync>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `object` and return its id. See [`ContainerId`] for the
    /// same-order-on-every-rank requirement.
    pub fn register(&self, object: Arc<dyn Any + Send + Sync>) -> ContainerId {
        let mut slots = self.slots.lock();
        slots.push(object);
        let id = ContainerId(slots.len() - 1);
        log::trace!("registered container {id}");
        id
    }

    /// Resolve `id` back to its concrete shard type.
    pub fn resolve<S: Any + Send + Sync>(&self, id: ContainerId) -> Result<Arc<S>, DistArrayError> {
        let slot = {
            let slots = self.slots.lock();
            slots
                .get(id.0)
                .cloned()
                .ok_or(DistArrayError::UnknownContainer { id })?
        };
        slot.downcast::<S>()
            .map_err(|_| DistArrayError::ContainerTypeMismatch { id })
    }
}

/// Reliable, ordered (per source/destination channel) active-message
/// dispatch over a fixed SPMD world, plus the collectives used by the
/// container core.
///
/// Semantics required of every implementation:
/// - `post` is fire-and-forget and never blocks the issuing rank;
/// - each destination applies its incoming envelopes one at a time, in send
///   order per source (no ordering across sources);
/// - `barrier` returns only after every envelope posted by any rank before
///   the barrier has been applied, *including* envelopes posted by handlers
///   while draining (chained protocols terminate inside one barrier);
/// - the collectives match up across ranks in program order.
///
/// Implementations are cheap handles (`Clone` shares the underlying world),
/// so capabilities can carry one by value into message handlers.
pub trait Communicator: Clone + Send + Sync + 'static {
    /// This rank's id in `[0, size)`.
    fn rank(&self) -> usize;

    /// World size.
    fn size(&self) -> usize;

    /// Dispatch one active message to `dest`.
    fn post(&self, dest: usize, envelope: Envelope);

    /// Collective; returns only after global quiescence.
    fn barrier(&self);

    /// Collective; every rank contributes `count` and receives the
    /// rank-indexed vector of all contributions.
    fn all_gather_count(&self, count: usize) -> Vec<usize>;

    /// Collective sum reduction.
    fn all_reduce_sum(&self, value: usize) -> usize {
        self.all_gather_count(value).into_iter().sum()
    }

    /// Collective, same-order container registration on this rank's registry.
    fn register(&self, object: Arc<dyn Any + Send + Sync>) -> ContainerId;

    /// This rank's registry: the view envelopes resolve against, also used
    /// by capabilities to reach live container state between messages.
    fn registry(&self) -> &Registry;
}
