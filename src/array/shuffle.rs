//! Global shuffle: scatter-then-rebalance redistribution.
//!
//! Random placement alone leaves partitions unbalanced, and retrying random
//! placement until balance holds is unbounded in message count. The shuffle
//! therefore runs in two phases:
//!
//! 1. **Scatter**: each rank relocates every value it holds to a uniformly
//!    random rank's staging buffer (positional information is deliberately
//!    discarded), then barriers. Staged counts are now unbalanced with
//!    expectation `N/P`.
//! 2. **Rebalance**: staged counts are all-gathered into `SA`; the target
//!    vector `TA` is the partition's per-rank lengths. Every rank recomputes
//!    the same [`transfer_plan`] from `O(P)` scalars, donors ship batched
//!    surplus to recipients, and after a final barrier each rank's staging
//!    buffer holds exactly `TA[rank]` values and becomes its local storage.
//!
//! The plan moves exactly the minimum number of elements needed to reach
//! balance; total traffic is bounded by `O(N/P)` per rank.

use rand::Rng;

use crate::comm::Communicator;
use crate::error::DistArrayError;

use super::DistArray;

/// One planned movement of `count` staged values from rank `from` to rank
/// `to`. Plans are never transmitted: each rank recomputes the portion it
/// participates in from the gathered counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: usize,
    pub to: usize,
    pub count: usize,
}

/// Compute the deterministic rebalance plan from staged counts `sa` and
/// target counts `ta` (equal sums required).
///
/// Two monotonically advancing cursors: the outer cursor walks destinations
/// in rank order, the donor cursor walks sources of surplus and never moves
/// backward. Exact balance (`sa[c] == ta[c]`) advances the donor cursor;
/// such ranks participate in no transfer and must not stall it. Evaluation
/// stops once the donor cursor passes `horizon`: a rank only needs the plan
/// portion in which it can still appear as donor, so it passes its own rank
/// id (pass `sa.len()` for the full plan).
pub fn transfer_plan(sa: &[usize], ta: &[usize], horizon: usize) -> Vec<Transfer> {
    debug_assert_eq!(sa.len(), ta.len());
    debug_assert_eq!(sa.iter().sum::<usize>(), ta.iter().sum::<usize>());
    let mut sa = sa.to_vec();
    let mut plan = Vec::new();
    let mut donor = 0usize;
    for dest in 0..sa.len() {
        while sa[dest] < ta[dest] {
            while donor < sa.len() && sa[donor] <= ta[donor] {
                donor += 1;
            }
            assert!(donor < sa.len(), "rebalance ran out of surplus donors");
            let deficit = ta[dest] - sa[dest];
            let surplus = sa[donor] - ta[donor];
            let count = deficit.min(surplus);
            plan.push(Transfer {
                from: donor,
                to: dest,
                count,
            });
            sa[donor] -= count;
            sa[dest] += count;
        }
        if donor > horizon {
            break;
        }
    }
    plan
}

pub(crate) fn global_shuffle<T, C, R>(array: &DistArray<T, C>, rng: &mut R)
where
    T: Send + 'static,
    C: Communicator,
    R: Rng,
{
    let comm = array.comm().clone();
    let me = comm.rank();
    let ranks = comm.size();
    let handle = array.handle();

    comm.barrier();

    // Phase 1: relocate every local value to a uniformly random rank's
    // staging buffer. This is a relocation, not an index-preserving write.
    let drained = std::mem::take(&mut array.shard().state.lock().values);
    for value in drained {
        handle.stage_one(rng.gen_range(0..ranks), value);
    }
    comm.barrier();

    // Phase 2: deterministic rebalance from O(P) aggregated counts.
    let staged = array.shard().state.lock().staging.len();
    let sa = comm.all_gather_count(staged);
    let ta = array.partition().target_sizes();
    let total: usize = sa.iter().sum();
    if total != array.len() {
        // Mismatched collective state across ranks; fail fast.
        panic!(
            "fatal: {}",
            DistArrayError::StagedCountMismatch {
                staged: total,
                expected: array.len(),
            }
        );
    }
    log::debug!("rank {me}: staged counts {sa:?}, targets {ta:?}");

    for transfer in transfer_plan(&sa, &ta, me) {
        if transfer.from != me {
            continue;
        }
        // Which staged elements a donor gives away is arbitrary; take them
        // from the tail.
        let batch = {
            let mut state = array.shard().state.lock();
            let keep = state.staging.len() - transfer.count;
            state.staging.split_off(keep)
        };
        log::debug!("rank {me}: sending {} staged values to rank {}", batch.len(), transfer.to);
        handle.stage_batch(transfer.to, batch);
    }
    comm.barrier();

    let mut state = array.shard().state.lock();
    let staged = std::mem::take(&mut state.staging);
    assert_eq!(
        staged.len(),
        ta[me],
        "rank {me} finished a global shuffle holding {} values, target {}",
        staged.len(),
        ta[me]
    );
    state.values = staged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(plan: &[Transfer], sa: &[usize]) -> Vec<usize> {
        let mut sa = sa.to_vec();
        for t in plan {
            assert!(sa[t.from] >= t.count, "donor overdrawn");
            sa[t.from] -= t.count;
            sa[t.to] += t.count;
        }
        sa
    }

    #[test]
    fn plan_reaches_exact_targets() {
        let sa = [7, 1, 4, 0];
        let ta = [3, 3, 3, 3];
        let plan = transfer_plan(&sa, &ta, sa.len());
        assert_eq!(apply(&plan, &sa), ta);
        // Moves the minimum necessary: total moved equals total deficit.
        let moved: usize = plan.iter().map(|t| t.count).sum();
        assert_eq!(moved, 5);
    }

    #[test]
    fn balanced_input_needs_no_transfers() {
        let sa = [4, 4, 4];
        let ta = [4, 4, 4];
        assert!(transfer_plan(&sa, &ta, sa.len()).is_empty());
    }

    #[test]
    fn exactly_balanced_rank_does_not_stall_the_donor_cursor() {
        // Rank 1 has zero surplus and zero deficit; the cursor must skip it
        // and reach rank 2's surplus.
        let sa = [0, 3, 9];
        let ta = [4, 3, 5];
        let plan = transfer_plan(&sa, &ta, sa.len());
        assert_eq!(
            plan,
            vec![Transfer {
                from: 2,
                to: 0,
                count: 4
            }]
        );
    }

    #[test]
    fn one_donor_feeds_many_and_many_feed_one() {
        let sa = [10, 0, 0];
        let ta = [4, 3, 3];
        let plan = transfer_plan(&sa, &ta, sa.len());
        assert_eq!(apply(&plan, &sa), ta);

        let sa = [4, 4, 0];
        let ta = [1, 1, 6];
        let plan = transfer_plan(&sa, &ta, sa.len());
        assert_eq!(apply(&plan, &sa), ta);
    }

    #[test]
    fn uneven_last_target() {
        // N=10, P=4: targets [3,3,3,1], not a uniform block.
        let sa = [1, 1, 1, 7];
        let ta = [3, 3, 3, 1];
        let plan = transfer_plan(&sa, &ta, sa.len());
        assert_eq!(apply(&plan, &sa), ta);
    }

    #[test]
    fn horizon_truncation_preserves_own_transfers() {
        let sa = [0, 6, 1, 5];
        let ta = [3, 3, 3, 3];
        let full = transfer_plan(&sa, &ta, sa.len());
        for me in 0..sa.len() {
            let truncated = transfer_plan(&sa, &ta, me);
            let mine: Vec<_> = full.iter().filter(|t| t.from == me).collect();
            let mine_truncated: Vec<_> = truncated.iter().filter(|t| t.from == me).collect();
            assert_eq!(mine, mine_truncated, "donor {me}");
        }
    }

    #[test]
    fn empty_plan_for_empty_world() {
        let plan = transfer_plan(&[0, 0], &[0, 0], 2);
        assert!(plan.is_empty());
    }
}
