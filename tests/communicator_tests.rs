mod util;
use util::spmd;

use std::sync::{Arc, Mutex};

use dist_array::comm::{Communicator, Registry, SerialComm, ThreadComm};
use dist_array::error::DistArrayError;

type Log = Mutex<Vec<usize>>;

/// Each rank registers its own log object; collective same-order
/// registration gives every rank the same id for it.
fn register_log<C: Communicator>(comm: &C) -> (Arc<Log>, dist_array::comm::ContainerId) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let id = comm.register(log.clone());
    (log, id)
}

#[test]
fn serial_comm_defers_envelopes_until_barrier() {
    let comm = SerialComm::new();
    let (log, id) = register_log(&comm);

    comm.post(
        0,
        Box::new(move |registry: &Registry| {
            registry.resolve::<Log>(id).unwrap().lock().unwrap().push(7);
        }),
    );
    assert!(log.lock().unwrap().is_empty(), "fire-and-forget must not apply eagerly");

    comm.barrier();
    assert_eq!(*log.lock().unwrap(), vec![7]);
}

#[test]
fn serial_comm_collectives_are_identity() {
    let comm = SerialComm::new();
    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    assert_eq!(comm.all_gather_count(9), vec![9]);
    assert_eq!(comm.all_reduce_sum(9), 9);
}

#[test]
fn same_channel_messages_apply_in_send_order() {
    spmd(2, |comm| {
        let (log, id) = register_log(&comm);
        if comm.rank() == 0 {
            for i in 0..10 {
                comm.post(
                    1,
                    Box::new(move |registry: &Registry| {
                        registry.resolve::<Log>(id).unwrap().lock().unwrap().push(i);
                    }),
                );
            }
        }
        comm.barrier();
        if comm.rank() == 1 {
            assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        } else {
            assert!(log.lock().unwrap().is_empty());
        }
    });
}

#[test]
fn barrier_drains_chained_messages() {
    // Rank 0 posts to rank 1; the handler posts onward to rank 2. One
    // barrier must reach quiescence across the whole chain.
    spmd(3, |comm| {
        let (log, id) = register_log(&comm);
        if comm.rank() == 0 {
            let relay = comm.clone();
            comm.post(
                1,
                Box::new(move |registry: &Registry| {
                    registry.resolve::<Log>(id).unwrap().lock().unwrap().push(1);
                    relay.post(
                        2,
                        Box::new(move |registry: &Registry| {
                            registry.resolve::<Log>(id).unwrap().lock().unwrap().push(2);
                        }),
                    );
                }),
            );
        }
        comm.barrier();
        match comm.rank() {
            1 => assert_eq!(*log.lock().unwrap(), vec![1]),
            2 => assert_eq!(*log.lock().unwrap(), vec![2]),
            _ => assert!(log.lock().unwrap().is_empty()),
        }
    });
}

#[test]
fn all_gather_and_reduce_match_contributions() {
    spmd(4, |comm| {
        let mine = (comm.rank() + 1) * 10;
        assert_eq!(comm.all_gather_count(mine), vec![10, 20, 30, 40]);
        assert_eq!(comm.all_reduce_sum(comm.rank()), 6);
    });
}

#[test]
fn back_to_back_collectives_do_not_bleed() {
    spmd(3, |comm| {
        for round in 0..5 {
            let gathered = comm.all_gather_count(comm.rank() + round);
            assert_eq!(gathered, vec![round, 1 + round, 2 + round]);
            comm.barrier();
        }
    });
}

#[test]
fn registry_reports_unknown_and_mismatched_containers() {
    let registry = Registry::new();
    let id = registry.register(Arc::new(Mutex::new(0u32)));

    let err = registry.resolve::<Mutex<u64>>(id).unwrap_err();
    assert!(matches!(err, DistArrayError::ContainerTypeMismatch { .. }));

    let other = Registry::new();
    let err = other.resolve::<Mutex<u32>>(id).unwrap_err();
    assert!(matches!(err, DistArrayError::UnknownContainer { .. }));

    assert!(registry.resolve::<Mutex<u32>>(id).is_ok());
}

#[test]
#[should_panic(expected = "world size")]
fn zero_rank_world_is_rejected() {
    let _ = ThreadComm::world(0);
}
