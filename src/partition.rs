//! Block partition of a contiguous logical index space across ranks.
//!
//! The partition is pure index math derived from the global length `N` and
//! the rank count `P`: `block = ceil(N / P)`, rank `r` owns the index range
//! `[r*block, min((r+1)*block, N))`. The last rank's range may be shorter
//! than a block (never longer), and for degenerate shapes (`N < P`) trailing
//! ranks own nothing at all.
//!
//! # Invariants
//! - Every index in `[0, N)` has exactly one owner in `[0, P)`.
//! - `owner` is monotonically non-decreasing in the index.
//! - Per-rank lengths sum to `N`.

/// Owner/offset math for one `(global_len, ranks)` shape. `Copy` on purpose:
/// the container keeps the current shape behind a lock and callers work on
/// a copied value; a resize simply replaces the stored shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPartition {
    global_len: usize,
    block: usize,
    ranks: usize,
}

impl BlockPartition {
    pub fn new(global_len: usize, ranks: usize) -> Self {
        assert!(ranks > 0, "partition requires at least one rank");
        Self {
            global_len,
            block: global_len.div_ceil(ranks),
            ranks,
        }
    }

    pub fn global_len(&self) -> usize {
        self.global_len
    }

    pub fn block_len(&self) -> usize {
        self.block
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Rank owning `index`. Fatal if `index` is outside the logical range:
    /// the mutation protocol has no recoverable-error path mid-collective.
    pub fn owner(&self, index: usize) -> usize {
        self.bounds_check(index);
        index / self.block
    }

    /// Offset of `index` within its owner's local slice.
    pub fn local_index(&self, index: usize) -> usize {
        self.bounds_check(index);
        index % self.block
    }

    /// Global index of `rank`'s local offset `local`.
    pub fn global_index(&self, rank: usize, local: usize) -> usize {
        rank * self.block + local
    }

    /// Length of `rank`'s owned range.
    pub fn local_len(&self, rank: usize) -> usize {
        let start = (rank * self.block).min(self.global_len);
        let end = ((rank + 1) * self.block).min(self.global_len);
        end - start
    }

    /// Per-rank owned lengths, indexed by rank. This is the target vector
    /// `TA` of the shuffle rebalance phase.
    pub fn target_sizes(&self) -> Vec<usize> {
        (0..self.ranks).map(|r| self.local_len(r)).collect()
    }

    fn bounds_check(&self, index: usize) {
        assert!(
            index < self.global_len,
            "index {index} out of bounds for distributed array of length {}",
            self.global_len
        );
    }
}
