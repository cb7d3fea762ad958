//! Threads-as-ranks in-process backend.
//!
//! `ThreadComm::world(n)` builds `n` connected endpoints over one shared
//! state; a test (or driver) moves each endpoint onto its own thread and runs
//! SPMD code against it. No global statics: the world is explicit shared
//! state dropped when the last endpoint goes away.
//!
//! Quiescence detection: `post` bumps an in-flight counter before enqueueing
//! and the drain loop decrements it only *after* a handler finishes, so
//! messages posted by a running handler are counted before their parent
//! retires. Once every rank sits at the rendezvous nothing is executing, the
//! counter is stable, and all ranks read the same value; a barrier round
//! repeats until that value is zero.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{Communicator, ContainerId, Envelope, Registry};

/// How long a rank waits at a rendezvous before concluding that another rank
/// died (e.g. a failed assertion in an SPMD test) and panicking instead of
/// hanging forever.
const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);

/// One rank's endpoint into an in-process world. Cheap to clone.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<CommShared>,
}

struct CommShared {
    size: usize,
    mailboxes: Vec<Mutex<VecDeque<Envelope>>>,
    registries: Vec<Registry>,
    in_flight: AtomicUsize,
    rendezvous: Rendezvous,
    gather: Mutex<Vec<usize>>,
}

impl ThreadComm {
    /// Build a world of `ranks` connected endpoints, one per rank.
    pub fn world(ranks: usize) -> Vec<ThreadComm> {
        assert!(ranks > 0, "world size must be at least 1");
        let shared = Arc::new(CommShared {
            size: ranks,
            mailboxes: (0..ranks).map(|_| Mutex::new(VecDeque::new())).collect(),
            registries: (0..ranks).map(|_| Registry::new()).collect(),
            in_flight: AtomicUsize::new(0),
            rendezvous: Rendezvous::new(ranks),
            gather: Mutex::new(vec![0; ranks]),
        });
        (0..ranks)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Execute everything currently addressed to this rank, including
    /// envelopes enqueued by handlers run during the drain.
    fn drain(&self) {
        loop {
            let envelope = self.shared.mailboxes[self.rank].lock().pop_front();
            match envelope {
                Some(envelope) => {
                    envelope(&self.shared.registries[self.rank]);
                    self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                None => break,
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn post(&self, dest: usize, envelope: Envelope) {
        assert!(
            dest < self.shared.size,
            "dest rank {dest} out of range for world of {}",
            self.shared.size
        );
        // Count before enqueueing so the counter never reads zero while a
        // message exists anywhere.
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        self.shared.mailboxes[dest].lock().push_back(envelope);
    }

    fn barrier(&self) {
        let mut round = 0u32;
        loop {
            self.drain();
            self.shared.rendezvous.wait();
            // Nobody is executing a handler here, so the counter is stable
            // and every rank reads the same value.
            let quiescent = self.shared.in_flight.load(Ordering::SeqCst) == 0;
            self.shared.rendezvous.wait();
            if quiescent {
                break;
            }
            round += 1;
            log::trace!("rank {}: barrier round {round}, messages still in flight", self.rank);
        }
    }

    fn all_gather_count(&self, count: usize) -> Vec<usize> {
        let shared = &self.shared;
        // Entry rendezvous keeps a fast rank from overwriting slots another
        // rank is still reading from a previous collective.
        shared.rendezvous.wait();
        shared.gather.lock()[self.rank] = count;
        shared.rendezvous.wait();
        let gathered = shared.gather.lock().clone();
        shared.rendezvous.wait();
        gathered
    }

    fn register(&self, object: Arc<dyn Any + Send + Sync>) -> ContainerId {
        self.shared.registries[self.rank].register(object)
    }

    fn registry(&self) -> &Registry {
        &self.shared.registries[self.rank]
    }
}

/// Reusable counting barrier with generation tracking.
struct Rendezvous {
    size: usize,
    state: Mutex<RendezvousState>,
    cvar: Condvar,
}

struct RendezvousState {
    arrived: usize,
    generation: u64,
}

impl Rendezvous {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(RendezvousState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }
        while state.generation == generation {
            if self.cvar.wait_for(&mut state, RENDEZVOUS_TIMEOUT).timed_out() {
                panic!(
                    "rendezvous timed out after {RENDEZVOUS_TIMEOUT:?}; a rank likely aborted mid-collective"
                );
            }
        }
    }
}
