//! Shared SPMD test harness: one scoped thread per rank.

use dist_array::comm::ThreadComm;

/// Run `f` once per rank over a fresh `ranks`-wide in-process world. Panics
/// in any rank propagate when the scope joins; surviving ranks blocked on a
/// collective are released by the rendezvous timeout.
pub fn spmd<F>(ranks: usize, f: F)
where
    F: Fn(ThreadComm) + Send + Sync,
{
    let endpoints = ThreadComm::world(ranks);
    std::thread::scope(|scope| {
        for comm in endpoints {
            let f = &f;
            scope.spawn(move || f(comm));
        }
    });
}
