//! Property tests for the shuffle rebalance planner.

use dist_array::array::{transfer_plan, Transfer};
use dist_array::partition::BlockPartition;
use proptest::prelude::*;

/// Replay a plan against staged counts, checking donors are never overdrawn.
fn apply(plan: &[Transfer], sa: &[usize]) -> Vec<usize> {
    let mut sa = sa.to_vec();
    for t in plan {
        assert!(t.count > 0, "plan contains an empty transfer");
        assert!(sa[t.from] >= t.count, "donor rank {} overdrawn", t.from);
        sa[t.from] -= t.count;
        sa[t.to] += t.count;
    }
    sa
}

/// Staged counts as a scatter would produce them: darts thrown at ranks.
fn scatter_counts(darts: &[usize], ranks: usize) -> Vec<usize> {
    let mut sa = vec![0; ranks];
    for dart in darts {
        sa[dart % ranks] += 1;
    }
    sa
}

proptest! {
    #[test]
    fn any_scatter_rebalances_to_exact_targets(
        darts in prop::collection::vec(0usize..64, 0..200),
        ranks in 1usize..8,
    ) {
        let n = darts.len();
        let sa = scatter_counts(&darts, ranks);
        let ta = BlockPartition::new(n, ranks).target_sizes();

        let plan = transfer_plan(&sa, &ta, ranks);
        prop_assert_eq!(apply(&plan, &sa), ta);
    }

    #[test]
    fn total_moved_equals_total_deficit(
        darts in prop::collection::vec(0usize..64, 0..200),
        ranks in 1usize..8,
    ) {
        let sa = scatter_counts(&darts, ranks);
        let ta = BlockPartition::new(darts.len(), ranks).target_sizes();

        let moved: usize = transfer_plan(&sa, &ta, ranks).iter().map(|t| t.count).sum();
        let deficit: usize = sa
            .iter()
            .zip(&ta)
            .map(|(&s, &t)| t.saturating_sub(s))
            .sum();
        prop_assert_eq!(moved, deficit);
    }

    #[test]
    fn every_rank_recovers_its_own_transfers_from_a_truncated_plan(
        darts in prop::collection::vec(0usize..64, 0..200),
        ranks in 1usize..8,
    ) {
        let sa = scatter_counts(&darts, ranks);
        let ta = BlockPartition::new(darts.len(), ranks).target_sizes();
        let full = transfer_plan(&sa, &ta, ranks);

        for me in 0..ranks {
            let truncated = transfer_plan(&sa, &ta, me);
            let mine: Vec<_> = full.iter().filter(|t| t.from == me).cloned().collect();
            let mine_truncated: Vec<_> =
                truncated.iter().filter(|t| t.from == me).cloned().collect();
            prop_assert_eq!(mine, mine_truncated, "donor {}", me);
        }
    }

    #[test]
    fn donors_give_only_surplus_and_recipients_only_lack(
        darts in prop::collection::vec(0usize..64, 0..200),
        ranks in 1usize..8,
    ) {
        let sa = scatter_counts(&darts, ranks);
        let ta = BlockPartition::new(darts.len(), ranks).target_sizes();

        for t in transfer_plan(&sa, &ta, ranks) {
            prop_assert!(sa[t.from] > ta[t.from], "rank {} donated without surplus", t.from);
            prop_assert!(sa[t.to] < ta[t.to], "rank {} received without deficit", t.to);
            prop_assert_ne!(t.from, t.to);
        }
    }
}
