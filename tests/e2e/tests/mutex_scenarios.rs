//! End-to-end tests of the normal mutual-exclusion protocol

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use treelock_core::TreeTopology;
use treelock_e2e_tests::{fast_config, init_logging, Cluster};
use treelock_node::NodeError;
use treelock_protocol::Holder;

#[tokio::test]
async fn initialization_orients_the_tree_toward_node_zero() {
    init_logging();
    let topology = TreeTopology::line(3).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());

    cluster
        .wait_until("initial orientation", |snaps| {
            snaps[0].holder == Holder::Local
                && snaps[1].holder == Holder::Neighbor(0)
                && snaps[2].holder == Holder::Neighbor(1)
        })
        .await;
    cluster.assert_tree();
    cluster.shutdown();
}

#[tokio::test]
async fn token_travels_down_a_line_to_the_requester() {
    init_logging();
    let topology = TreeTopology::line(3).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    cluster.handle(2).enter_critical_section().unwrap();
    cluster
        .wait_until("leaf inside the critical section", |snaps| {
            snaps[2].using
        })
        .await;

    let snaps = cluster.snapshots();
    assert_eq!(snaps[2].holder, Holder::Local);
    assert_eq!(snaps[1].holder, Holder::Neighbor(2));
    assert_eq!(snaps[0].holder, Holder::Neighbor(1));
    cluster.assert_tree();
    cluster.shutdown();
}

#[tokio::test]
async fn star_contention_is_granted_in_request_order() {
    init_logging();
    let topology = TreeTopology::star(4).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    // Leaves request in strict order: each request must be visible at the
    // centre (queued or already granted) before the next leaf asks.
    for leaf in [1u32, 2, 3] {
        cluster.handle(leaf).enter_critical_section().unwrap();
        cluster
            .wait_until("request registered at the centre", |snaps| {
                snaps[0].queue.contains(&leaf)
                    || snaps[0].holder == Holder::Neighbor(leaf)
                    || snaps[leaf as usize].using
            })
            .await;
    }

    for leaf in [1u32, 2, 3] {
        cluster
            .wait_until("grant in FIFO order", |snaps| snaps[leaf as usize].using)
            .await;
        // Nobody else may be inside at the same time.
        let users = cluster.snapshots().iter().filter(|s| s.using).count();
        assert_eq!(users, 1);
        cluster.handle(leaf).quit_critical_section().unwrap();
        cluster
            .wait_until("section released", |snaps| !snaps[leaf as usize].using)
            .await;
    }

    cluster.shutdown();
}

#[tokio::test]
async fn every_requester_is_eventually_served() {
    init_logging();
    let topology = TreeTopology::line(5).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    for handle in &cluster.handles {
        handle.enter_critical_section().unwrap();
    }

    let mut served = HashSet::new();
    while served.len() < cluster.handles.len() {
        cluster
            .wait_until("someone inside the critical section", |snaps| {
                snaps.iter().any(|s| s.using)
            })
            .await;
        let user = cluster
            .snapshots()
            .iter()
            .find(|s| s.using)
            .map(|s| s.number)
            .unwrap();
        served.insert(user);
        cluster.handle(user).quit_critical_section().unwrap();
        cluster
            .wait_until("section released", move |snaps| {
                !snaps[user as usize].using
            })
            .await;
    }

    cluster.shutdown();
}

#[tokio::test]
async fn random_tree_serves_every_node() {
    init_logging();
    let topology = TreeTopology::random(8, &mut StdRng::seed_from_u64(2026)).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    for handle in &cluster.handles {
        handle.enter_critical_section().unwrap();
    }

    let mut served = HashSet::new();
    while served.len() < cluster.handles.len() {
        cluster
            .wait_until("someone inside the critical section", |snaps| {
                snaps.iter().any(|s| s.using)
            })
            .await;
        let user = cluster
            .snapshots()
            .iter()
            .find(|s| s.using)
            .map(|s| s.number)
            .unwrap();
        served.insert(user);
        cluster.handle(user).quit_critical_section().unwrap();
        cluster
            .wait_until("section released", move |snaps| {
                !snaps[user as usize].using
            })
            .await;
    }

    cluster.assert_tree();
    cluster.shutdown();
}

#[tokio::test]
async fn double_enter_is_rejected_by_the_driver_guard() {
    init_logging();
    let topology = TreeTopology::line(3).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    cluster.handle(2).enter_critical_section().unwrap();
    cluster
        .wait_until("local request registered", |snaps| {
            snaps[2].iasked || snaps[2].using
        })
        .await;

    let second = cluster.handle(2).enter_critical_section();
    assert!(matches!(
        second,
        Err(NodeError::EnterRejected { .. })
    ));

    // The queue never carries a duplicate self-entry.
    cluster
        .wait_until("request resolved", |snaps| snaps[2].using)
        .await;
    let queue = &cluster.snapshots()[2].queue;
    assert!(queue.is_empty(), "unexpected residue in queue: {:?}", queue);

    cluster.shutdown();
}
