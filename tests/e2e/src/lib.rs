//! Shared helpers for the full-stack test suite
//!
//! Spawns real node tasks over the in-process mailbox router and gives
//! tests snapshot-based waiting so nothing is timing sensitive.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use treelock_core::{mailbox_name, NodeId, Transport, TreeTopology};
use treelock_node::node::{MutexNode, NodeHandle, NodeRuntimeConfig};
use treelock_protocol::{Holder, NodeSnapshot};
use treelock_transport::MailboxRouter;

/// A running cluster of node tasks.
pub struct Cluster {
    pub router: Arc<MailboxRouter>,
    pub handles: Vec<NodeHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Register every mailbox, then spawn every node.
    pub fn spawn(topology: &TreeTopology, config: NodeRuntimeConfig) -> Self {
        let router = Arc::new(MailboxRouter::new());
        let receivers: Vec<_> = topology
            .node_ids()
            .map(|id| {
                router
                    .register(&mailbox_name(id))
                    .expect("mailbox registration failed")
            })
            .collect();

        let mut handles = Vec::with_capacity(topology.node_count());
        let mut tasks = Vec::with_capacity(topology.node_count());
        for (id, wire_rx) in topology.node_ids().zip(receivers) {
            let (handle, task) = MutexNode::spawn(
                id,
                topology.neighbors(id).unwrap().to_vec(),
                Arc::clone(&router) as Arc<dyn Transport>,
                wire_rx,
                config.clone(),
            );
            handles.push(handle);
            tasks.push(task);
        }

        Self {
            router,
            handles,
            tasks,
        }
    }

    pub fn handle(&self, id: NodeId) -> &NodeHandle {
        &self.handles[id as usize]
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.handles.iter().map(|h| h.snapshot()).collect()
    }

    /// Poll until `predicate` holds over the snapshot vector, panicking
    /// with the final state if it never does.
    pub async fn wait_until<F>(&self, what: &str, predicate: F)
    where
        F: Fn(&[NodeSnapshot]) -> bool,
    {
        let result = timeout(Duration::from_secs(10), async {
            loop {
                if predicate(&self.snapshots()) {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        if result.is_err() {
            panic!("timed out waiting for {}; state: {:#?}", what, self.snapshots());
        }
    }

    /// Assert the quiescent tree shape: a unique root, every holder path
    /// reaching it over tree edges, and any user sitting at the root.
    pub fn assert_tree(&self) {
        let snaps = self.snapshots();
        assert!(
            snaps.iter().all(|s| !s.recovering),
            "tree asserted while a node is recovering: {:#?}",
            snaps
        );

        let roots: Vec<NodeId> = snaps
            .iter()
            .filter(|s| s.holder == Holder::Local)
            .map(|s| s.number)
            .collect();
        assert_eq!(roots.len(), 1, "expected a unique root, found {:?}", roots);
        let root = roots[0];

        for s in &snaps {
            let mut at = s.number;
            for _ in 0..snaps.len() {
                if at == root {
                    break;
                }
                let next = snaps[at as usize]
                    .holder
                    .neighbor()
                    .expect("non-root with a non-neighbour holder");
                assert!(
                    snaps[at as usize].neighbors.contains(&next),
                    "holder of {} is not a neighbour",
                    at
                );
                at = next;
            }
            assert_eq!(at, root, "holder path from {} does not reach the root", s.number);
        }

        if let Some(user) = snaps.iter().find(|s| s.using) {
            assert_eq!(user.holder, Holder::Local, "user is not the privilege root");
        }
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Runtime settings tuned for tests: short quiescence, no scheduled exits.
pub fn fast_config() -> NodeRuntimeConfig {
    NodeRuntimeConfig {
        quiescence: Duration::from_millis(50),
        auto_quit: None,
    }
}

/// Install a subscriber once so failing tests can be rerun with RUST_LOG.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
