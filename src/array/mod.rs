//! Partitioned, actively-mutable distributed array.
//!
//! A [`DistArray`] block-partitions a logical index range `[0, N)` across the
//! ranks of a [`Communicator`] world. Mutation follows the owner-computes
//! convention: every write is an active message executed on the rank that
//! owns the index, so a slot is never raced: the owner applies its incoming
//! messages one at a time. Visibility is bulk-synchronous: async operations
//! issued between barriers are guaranteed applied once any rank crosses the
//! next barrier ([`for_all`](DistArray::for_all) and the shuffles barrier
//! internally).
//!
//! Construction, resize, the traversals, the shuffles, and drop are
//! collective: every rank must call them in the same order with the same
//! arguments. That is a caller precondition, not independently verified.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::comm::Communicator;
use crate::partition::BlockPartition;

mod handle;
pub mod shuffle;

pub use handle::ArrayHandle;
pub use shuffle::{transfer_plan, Transfer};

use handle::Shard;

/// A distributed array of `T` over the ranks of `C`.
///
/// Each rank holds one instance; the instances are collectively one
/// container. Local storage is this rank's contiguous slice of the index
/// space; remote slots are reached only through the async mutation protocol.
pub struct DistArray<T: Send + 'static, C: Communicator> {
    handle: ArrayHandle<T, C>,
    shard: Arc<Shard<T>>,
    default_value: T,
}

impl<T: Clone + Send + 'static, C: Communicator> DistArray<T, C> {
    /// Collectively construct an array of `len` slots filled with
    /// `T::default()`. Includes the barrier required before first use.
    pub fn new(comm: C, len: usize) -> Self
    where
        T: Default,
    {
        Self::with_default(comm, len, T::default())
    }

    /// Collectively construct an array of `len` slots filled with
    /// `default_value`, which also pads future [`resize`](Self::resize) growth.
    pub fn with_default(comm: C, len: usize, default_value: T) -> Self {
        let shard = Arc::new(Shard::new(BlockPartition::new(0, comm.size())));
        let id = comm.register(shard.clone());
        let handle = ArrayHandle::new(comm, id);
        let mut array = Self {
            handle,
            shard,
            default_value,
        };
        array.resize(len);
        array
    }

    /// Collective resize, padding new slots with the array's default value.
    pub fn resize(&mut self, len: usize) {
        let fill = self.default_value.clone();
        self.resize_with(len, fill);
    }

    /// Collective resize, padding new slots with `fill`. Barrier-bracketed:
    /// the leading barrier drains in-flight writes, the trailing one keeps a
    /// fast rank from mutating under the old partition while a slow rank is
    /// still resizing. All ranks must pass the same `len`.
    ///
    /// The new partition is published through the shared shard, so every
    /// handle already cloned from this array (including ones captured inside
    /// message handlers) routes against the new shape from here on.
    pub fn resize_with(&mut self, len: usize, fill: T) {
        let comm = self.handle.comm().clone();
        comm.barrier();
        let part = BlockPartition::new(len, comm.size());
        let local_len = part.local_len(comm.rank());
        *self.shard.part.lock() = part;
        self.shard.state.lock().values.resize(local_len, fill);
        comm.barrier();
    }
}

impl<T: Send + 'static, C: Communicator> DistArray<T, C> {
    /// Global logical length.
    pub fn len(&self) -> usize {
        self.handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }

    /// Number of slots stored on this rank.
    pub fn local_len(&self) -> usize {
        self.shard.state.lock().values.len()
    }

    /// Rank owning `index`. Fatal if `index >= len()`.
    pub fn owner(&self, index: usize) -> usize {
        self.handle.owner(index)
    }

    pub fn is_mine(&self, index: usize) -> bool {
        self.handle.is_mine(index)
    }

    /// Global index of this rank's local offset.
    pub fn global_index(&self, local: usize) -> usize {
        self.partition().global_index(self.comm().rank(), local)
    }

    pub fn partition(&self) -> BlockPartition {
        *self.shard.part.lock()
    }

    /// The capability handle for this container, as passed to self-aware
    /// visitors. Cheap to clone; safe to capture in messages.
    pub fn handle(&self) -> ArrayHandle<T, C> {
        self.handle.clone()
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn comm(&self) -> &C {
        self.handle.comm()
    }

    /// See [`ArrayHandle::async_set`].
    pub fn async_set(&self, index: usize, value: T) {
        self.handle.async_set(index, value);
    }

    /// See [`ArrayHandle::async_visit`].
    pub fn async_visit<F>(&self, index: usize, visitor: F)
    where
        F: FnOnce(usize, &mut T) + Send + 'static,
    {
        self.handle.async_visit(index, visitor);
    }

    /// See [`ArrayHandle::async_visit_with_handle`].
    pub fn async_visit_with_handle<F>(&self, index: usize, visitor: F)
    where
        F: FnOnce(ArrayHandle<T, C>, usize, &mut T) + Send + 'static,
    {
        self.handle.async_visit_with_handle(index, visitor);
    }

    /// See [`ArrayHandle::async_binary_op_update`].
    pub fn async_binary_op_update<F>(&self, index: usize, value: T, op: F)
    where
        F: FnOnce(&mut T, T) + Send + 'static,
    {
        self.handle.async_binary_op_update(index, value, op);
    }

    /// See [`ArrayHandle::async_unary_op_update`].
    pub fn async_unary_op_update<F>(&self, index: usize, op: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.handle.async_unary_op_update(index, op);
    }

    /// Collective: barrier (making every previously issued async mutation
    /// visible), then invoke `f` over this rank's local `(index, value)`
    /// pairs in local storage order. No cross-rank ordering is implied.
    ///
    /// `f` runs while this rank's storage is locked, and the lock is not
    /// reentrant: `f` may post async operations against this array but must
    /// not call its storage-locking methods (`local_len`, the traversals,
    /// the shuffles).
    pub fn for_all<F>(&self, f: F)
    where
        F: FnMut(usize, &mut T),
    {
        self.comm().barrier();
        self.local_for_all(f);
    }

    /// [`for_all`](Self::for_all) without the leading barrier. The caller is
    /// responsible for knowing no in-flight remote write targets this rank.
    /// The same lock restriction on `f` applies.
    pub fn local_for_all<F>(&self, mut f: F)
    where
        F: FnMut(usize, &mut T),
    {
        let rank = self.comm().rank();
        let part = self.partition();
        let mut state = self.shard.state.lock();
        for (local, value) in state.values.iter_mut().enumerate() {
            f(part.global_index(rank, local), value);
        }
    }

    /// Collective: barrier, then uniformly permute this rank's local slice
    /// in place. Does not change which indices this rank owns; the global
    /// index-to-value mapping is no longer meaningful afterwards.
    pub fn local_shuffle<R: Rng>(&self, rng: &mut R) {
        self.comm().barrier();
        self.shard.state.lock().values.shuffle(rng);
    }

    /// [`local_shuffle`](Self::local_shuffle) with an internally seeded
    /// generator (fresh entropy per rank).
    pub fn local_shuffle_seeded(&self) {
        let mut rng = SmallRng::from_entropy();
        self.local_shuffle(&mut rng);
    }

    /// Collective: randomly permute the full value collection across all
    /// ranks while ending with every rank holding exactly its partition's
    /// target size. `rng` must be decorrelated across ranks (see
    /// [`crate::random::rank_seeded`]). See [`shuffle`] for the algorithm.
    pub fn global_shuffle<R: Rng>(&self, rng: &mut R) {
        shuffle::global_shuffle(self, rng);
    }

    pub(crate) fn shard(&self) -> &Shard<T> {
        &self.shard
    }
}

impl<T: Send + 'static, C: Communicator> Drop for DistArray<T, C> {
    /// Collective: drains any operations still in flight so no rank tears
    /// down storage another rank's messages still target. Skipped during
    /// unwind, where peer ranks can no longer be assumed to rendezvous.
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.comm().barrier();
        }
    }
}
