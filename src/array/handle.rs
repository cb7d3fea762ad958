//! Capability handle for issuing remote mutations against a [`DistArray`].
//!
//! The handle is the value a remote visitor receives when it needs to
//! re-issue messages against the owning container (the "self-aware" visitor
//! shape). It carries the communicator endpoint and the container's registry
//! id; partition geometry is resolved from this rank's shard at each use, so
//! a handle held across a collective resize always routes against the current
//! shape. It never aliases another rank's storage. Handles are obtained once
//! at construction (or via [`DistArray::handle`](super::DistArray::handle))
//! and passed by value into message handlers.
//!
//! [`DistArray`]: super::DistArray

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::comm::{Communicator, ContainerId, Registry};
use crate::partition::BlockPartition;

/// One rank's storage for a distributed array: the owned slice of the
/// logical index space plus the staging buffer used while a global shuffle
/// is in flight. Mutated only by envelopes executed on the owning rank and
/// by that rank's own code between barriers.
///
/// The partition lives under its own lock, never held together with the
/// state lock, so a visitor executing under the state lock can still route
/// follow-up messages through a handle.
pub(crate) struct Shard<T> {
    pub(crate) part: Mutex<BlockPartition>,
    pub(crate) state: Mutex<ShardState<T>>,
}

pub(crate) struct ShardState<T> {
    pub(crate) values: Vec<T>,
    pub(crate) staging: Vec<T>,
}

impl<T> Shard<T> {
    pub(crate) fn new(part: BlockPartition) -> Self {
        Self {
            part: Mutex::new(part),
            state: Mutex::new(ShardState {
                values: Vec::new(),
                staging: Vec::new(),
            }),
        }
    }
}

/// Capability for remote mutation of a distributed array.
///
/// All `async_*` operations are fire-and-forget active messages addressed to
/// the owner of the index; completion is guaranteed only after the next
/// barrier. An index outside `[0, len)` aborts the run.
pub struct ArrayHandle<T, C: Communicator> {
    comm: C,
    id: ContainerId,
    _elem: PhantomData<fn(T) -> T>,
}

impl<T, C: Communicator> Clone for ArrayHandle<T, C> {
    fn clone(&self) -> Self {
        Self {
            comm: self.comm.clone(),
            id: self.id,
            _elem: PhantomData,
        }
    }
}

impl<T: Send + 'static, C: Communicator> ArrayHandle<T, C> {
    pub(crate) fn new(comm: C, id: ContainerId) -> Self {
        Self {
            comm,
            id,
            _elem: PhantomData,
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// The current partition, read from the shared shard. Resizes are
    /// collective and barrier-bracketed, so every rank's copy agrees whenever
    /// an operation is legal to issue.
    pub fn partition(&self) -> BlockPartition {
        *self.local_shard().part.lock()
    }

    /// Global logical length.
    pub fn len(&self) -> usize {
        self.partition().global_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank owning `index`.
    pub fn owner(&self, index: usize) -> usize {
        self.partition().owner(index)
    }

    /// Whether this rank owns `index`.
    pub fn is_mine(&self, index: usize) -> bool {
        self.owner(index) == self.comm.rank()
    }

    /// Overwrite the slot at `index` on its owner. No acknowledgement.
    pub fn async_set(&self, index: usize, value: T) {
        self.async_visit(index, move |_, slot| *slot = value);
    }

    /// Deliver `visitor` to the owner of `index` with a mutable reference to
    /// the stored value. The visitor runs while the owner's shard is locked:
    /// it may read, mutate, and post further async operations (posting never
    /// locks shard storage), but it must not call collectives or
    /// storage-locking methods such as `local_len` or the traversals on the
    /// same array.
    pub fn async_visit<F>(&self, index: usize, visitor: F)
    where
        F: FnOnce(usize, &mut T) + Send + 'static,
    {
        let dest = self.partition().owner(index);
        let id = self.id;
        self.comm.post(
            dest,
            Box::new(move |registry: &Registry| {
                let shard = resolve_shard::<T>(registry, id);
                let local = shard.part.lock().local_index(index);
                let mut state = shard.state.lock();
                let len = state.values.len();
                let slot = state.values.get_mut(local).unwrap_or_else(|| {
                    panic!("local index {local} out of range for shard of {len} slots")
                });
                visitor(index, slot);
            }),
        );
    }

    /// Like [`async_visit`](Self::async_visit), but the visitor additionally
    /// receives a capability handle to the owning container (by value), for
    /// chained protocols that re-issue messages against the same array.
    pub fn async_visit_with_handle<F>(&self, index: usize, visitor: F)
    where
        F: FnOnce(ArrayHandle<T, C>, usize, &mut T) + Send + 'static,
    {
        let handle = self.clone();
        self.async_visit(index, move |index, slot| visitor(handle, index, slot));
    }

    /// Apply `op(stored, value)` in place at the owner of `index`. Updates
    /// from different source ranks may arrive in any order, so `op` must be
    /// commutative and associative if an order-independent result is wanted.
    pub fn async_binary_op_update<F>(&self, index: usize, value: T, op: F)
    where
        F: FnOnce(&mut T, T) + Send + 'static,
    {
        self.async_visit(index, move |_, slot| op(slot, value));
    }

    /// Apply `op(stored)` in place at the owner of `index`.
    pub fn async_unary_op_update<F>(&self, index: usize, op: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.async_visit(index, move |_, slot| op(slot));
    }

    /// Push one value into `dest`'s staging buffer (shuffle scatter phase).
    pub(crate) fn stage_one(&self, dest: usize, value: T) {
        let id = self.id;
        self.comm.post(
            dest,
            Box::new(move |registry: &Registry| {
                resolve_shard::<T>(registry, id).state.lock().staging.push(value);
            }),
        );
    }

    /// Append a batch to `dest`'s staging buffer (shuffle rebalance phase).
    pub(crate) fn stage_batch(&self, dest: usize, mut batch: Vec<T>) {
        let id = self.id;
        self.comm.post(
            dest,
            Box::new(move |registry: &Registry| {
                resolve_shard::<T>(registry, id)
                    .state
                    .lock()
                    .staging
                    .append(&mut batch);
            }),
        );
    }

    fn local_shard(&self) -> Arc<Shard<T>> {
        resolve_shard::<T>(self.comm.registry(), self.id)
    }
}

/// Registry failures inside a delivered envelope have no recoverable path:
/// the run is already mid-collective, so fail fast.
fn resolve_shard<T: Send + 'static>(registry: &Registry, id: ContainerId) -> Arc<Shard<T>> {
    registry
        .resolve::<Shard<T>>(id)
        .unwrap_or_else(|err| panic!("fatal active-message delivery failure: {err}"))
}
