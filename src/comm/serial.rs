//! Single-rank backend for serial unit tests and doctests.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Communicator, ContainerId, Envelope, Registry};

/// A world of exactly one rank. Envelopes queue until the next `barrier`,
/// which drains them (and anything they post) to quiescence, preserving the
/// deferred-visibility semantics of the multi-rank backends.
#[derive(Clone, Default)]
pub struct SerialComm {
    inner: Arc<SerialState>,
}

#[derive(Default)]
struct SerialState {
    registry: Registry,
    queue: Mutex<VecDeque<Envelope>>,
}

impl SerialComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn post(&self, dest: usize, envelope: Envelope) {
        assert_eq!(dest, 0, "SerialComm world has a single rank, got dest {dest}");
        self.inner.queue.lock().push_back(envelope);
    }

    fn barrier(&self) {
        loop {
            let envelope = self.inner.queue.lock().pop_front();
            match envelope {
                Some(envelope) => envelope(&self.inner.registry),
                None => break,
            }
        }
    }

    fn all_gather_count(&self, count: usize) -> Vec<usize> {
        vec![count]
    }

    fn register(&self, object: Arc<dyn Any + Send + Sync>) -> ContainerId {
        self.inner.registry.register(object)
    }

    fn registry(&self) -> &Registry {
        &self.inner.registry
    }
}
