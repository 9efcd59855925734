//! End-to-end tests of crash handling and the advise recovery handshake

use treelock_core::TreeTopology;
use treelock_e2e_tests::{fast_config, init_logging, Cluster};
use treelock_protocol::Holder;

#[tokio::test]
async fn crashed_root_regenerates_the_token() {
    init_logging();
    let topology = TreeTopology::line(3).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    cluster.handle(0).restart().unwrap();
    cluster
        .wait_until("crash visible", |snaps| snaps[0].recovering)
        .await;
    cluster
        .wait_until("root recovery complete", |snaps| {
            !snaps[0].recovering && snaps[0].holder == Holder::Local
        })
        .await;

    // Every neighbour still points at 0, so the tree is unchanged and the
    // regenerated token is immediately usable.
    let snaps = cluster.snapshots();
    assert_eq!(snaps[1].holder, Holder::Neighbor(0));
    assert_eq!(snaps[2].holder, Holder::Neighbor(1));
    cluster.assert_tree();

    cluster.handle(2).enter_critical_section().unwrap();
    cluster
        .wait_until("token flows after recovery", |snaps| snaps[2].using)
        .await;
    cluster.shutdown();
}

#[tokio::test]
async fn crashed_node_inside_the_section_loses_it_safely() {
    init_logging();
    let topology = TreeTopology::star(4).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    cluster.handle(0).enter_critical_section().unwrap();
    cluster
        .wait_until("centre inside the critical section", |snaps| snaps[0].using)
        .await;

    cluster.handle(0).restart().unwrap();
    cluster
        .wait_until("crash visible", |snaps| snaps[0].recovering)
        .await;
    cluster
        .wait_until("centre recovered", |snaps| !snaps[0].recovering)
        .await;

    let snap = &cluster.snapshots()[0];
    assert_eq!(snap.holder, Holder::Local);
    assert!(!snap.using, "crash must not leave the section occupied");
    cluster.assert_tree();

    cluster.handle(1).enter_critical_section().unwrap();
    cluster
        .wait_until("token moves to a leaf", |snaps| snaps[1].using)
        .await;
    cluster.shutdown();
}

#[tokio::test]
async fn crashed_leaf_restores_its_outstanding_request_edge() {
    init_logging();
    let topology = TreeTopology::line(3).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    // Park the token inside node 0 so the REQUEST chain from node 2 stays
    // pending at node 1.
    cluster.handle(0).enter_critical_section().unwrap();
    cluster
        .wait_until("root holds the section", |snaps| snaps[0].using)
        .await;

    cluster.handle(2).enter_critical_section().unwrap();
    cluster
        .wait_until("request parked at node 1", |snaps| {
            snaps[1].queue.contains(&2) && snaps[1].asked
        })
        .await;

    cluster.handle(2).restart().unwrap();
    cluster
        .wait_until("crash visible", |snaps| snaps[2].recovering)
        .await;
    cluster
        .wait_until("leaf recovered", |snaps| !snaps[2].recovering)
        .await;

    // Node 1 answered "away from you, and you are queued here": the leaf
    // re-learns holder=1 with asked=true and must not re-send a REQUEST.
    let snap = &cluster.snapshots()[2];
    assert_eq!(snap.holder, Holder::Neighbor(1));
    assert!(snap.asked);
    assert!(!snap.iasked, "the local demand died with the crash");
    assert!(snap.queue.is_empty());

    // Release the token; it flows through node 1 and parks at the leaf,
    // whose own demand was wiped.
    cluster.handle(0).quit_critical_section().unwrap();
    cluster
        .wait_until("token parks at the recovered leaf", |snaps| {
            snaps[2].holder == Holder::Local && !snaps[2].using
        })
        .await;
    cluster.assert_tree();

    // A fresh local request is granted on the spot.
    cluster.handle(2).enter_critical_section().unwrap();
    cluster
        .wait_until("parked token grants immediately", |snaps| snaps[2].using)
        .await;
    cluster.shutdown();
}

#[tokio::test]
async fn sequential_crashes_leave_a_sound_tree() {
    init_logging();
    let topology = TreeTopology::star(5).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    for node in [0u32, 3, 0, 1] {
        cluster.handle(node).restart().unwrap();
        cluster
            .wait_until("crash visible", move |snaps| snaps[node as usize].recovering)
            .await;
        cluster
            .wait_until("recovery complete", move |snaps| {
                snaps.iter().all(|s| !s.recovering)
                    && snaps[node as usize].holder != Holder::Unknown
            })
            .await;
        cluster.assert_tree();
    }

    // Liveness after the crash series.
    cluster.handle(4).enter_critical_section().unwrap();
    cluster
        .wait_until("token still flows", |snaps| snaps[4].using)
        .await;
    cluster.shutdown();
}

#[tokio::test]
async fn recovery_closes_after_one_exchange_per_neighbour() {
    init_logging();
    // Degree-4 centre: recovery needs exactly its degree in answers.
    let topology = TreeTopology::star(5).unwrap();
    let cluster = Cluster::spawn(&topology, fast_config());
    cluster
        .wait_until("initial orientation", |snaps| {
            snaps.iter().all(|s| s.holder != Holder::Unknown)
        })
        .await;

    cluster.handle(0).restart().unwrap();
    cluster
        .wait_until("recovering visible", |snaps| snaps[0].recovering)
        .await;
    cluster
        .wait_until("recovery closes", |snaps| !snaps[0].recovering)
        .await;
    cluster.assert_tree();
    cluster.shutdown();
}
