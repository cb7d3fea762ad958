//! # dist-array
//!
//! dist-array is a distributed container library providing a partitioned,
//! actively-mutable array abstraction for large-scale parallel computation
//! across cooperating ranks. The index space `[0, N)` is block-partitioned;
//! every mutation is an owner-computes active message; visibility is
//! bulk-synchronous (guaranteed only across barriers). The container's
//! centerpiece is [`global_shuffle`](array::DistArray::global_shuffle), which
//! uniformly permutes the value collection across all ranks while ending with
//! every rank holding exactly its partition's target size, using only
//! `O(ranks)` aggregate coordination.
//!
//! The messaging substrate is pluggable: the core consumes the
//! [`comm::Communicator`] trait (active-message dispatch, barrier,
//! collectives) and ships two in-process backends: [`comm::SerialComm`] for
//! single-rank use and [`comm::ThreadComm`], which runs one rank per thread
//! for SPMD tests and drivers.
//!
//! ## Determinism
//!
//! All randomized operations take an explicit `rand` generator; tests fix
//! seeds. [`random::rank_seeded`] derives decorrelated per-rank streams from
//! one logical seed for the collective shuffles.
//!
//! ## Example
//!
//! ```
//! use dist_array::prelude::*;
//!
//! let comm = SerialComm::new();
//! let arr = DistArray::<u64, _>::new(comm, 8);
//! for i in 0..8 {
//!     arr.async_set(i, (i * 10) as u64);
//! }
//! arr.async_binary_op_update(3, 5, |slot, x| *slot += x);
//! let mut seen = Vec::new();
//! arr.for_all(|index, value| seen.push((index, *value)));
//! assert_eq!(seen[3], (3, 35));
//! assert_eq!(seen.len(), 8);
//! ```

pub mod array;
pub mod comm;
pub mod error;
pub mod partition;
pub mod random;

/// A convenient prelude importing the most-used traits and types.
pub mod prelude {
    pub use crate::array::{ArrayHandle, DistArray};
    pub use crate::comm::{Communicator, SerialComm, ThreadComm};
    pub use crate::error::DistArrayError;
    pub use crate::partition::BlockPartition;
    pub use crate::random::rank_seeded;
}
