//! Rank-decorrelated random number generation.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::comm::Communicator;

/// Build a `SmallRng` for this rank from one logical `seed`, decorrelated
/// across ranks (splitmix-style spread of the rank id). Collective shuffles
/// require every rank to draw an independent stream; sharing one seed
/// verbatim would make all ranks throw identical darts.
pub fn rank_seeded<C: Communicator>(comm: &C, seed: u64) -> SmallRng {
    let spread = (comm.rank() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    SmallRng::seed_from_u64(seed ^ spread)
}
