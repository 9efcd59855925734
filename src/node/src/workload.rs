//! Synthetic workload driver and cluster-state observer
//!
//! The driver keeps two countdown counters per node, one toward the next
//! crash and one toward the next critical-section action, decremented every
//! tick. Snapshot reads gate the injected actions, but only advisorily:
//! the node re-validates everything inside its own event loop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use treelock_protocol::Holder;

use crate::config::WorkloadSection;
use crate::node::NodeHandle;

/// Randomised enter/quit/crash injector over a set of node handles.
pub struct WorkloadDriver {
    handles: Vec<NodeHandle>,
    config: WorkloadSection,
    rng: StdRng,
    next_crash: Vec<i64>,
    next_action: Vec<i64>,
}

impl WorkloadDriver {
    pub fn new(handles: Vec<NodeHandle>, config: WorkloadSection, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let next_crash = handles
            .iter()
            .map(|_| rng.gen_range(0..config.crash_initial_max) as i64)
            .collect();
        let next_action = handles
            .iter()
            .map(|_| rng.gen_range(0..config.action_initial_max) as i64)
            .collect();

        Self {
            handles,
            config,
            rng,
            next_crash,
            next_action,
        }
    }

    /// Tick until cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(nodes = self.handles.len(), "workload driver started");
        loop {
            let pause = Duration::from_millis(self.rng.gen_range(0..=self.config.tick_max_ms));
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(pause) => {}
            }
            self.tick();
        }
        info!("workload driver stopped");
    }

    fn tick(&mut self) {
        for i in 0..self.handles.len() {
            self.next_crash[i] -= 1;
            self.next_action[i] -= 1;

            let handle = &self.handles[i];
            let snapshot = handle.snapshot();

            if self.next_crash[i] <= 0 {
                // Never crash a node mid-recovery; concurrent recoveries on
                // one edge are outside the supported failure model.
                if !snapshot.recovering {
                    if let Err(e) = handle.restart() {
                        debug!(node = handle.number(), error = %e, "restart not delivered");
                    }
                }
                self.next_crash[i] = self.rng.gen_range(0..self.config.crash_restart_max) as i64;
            }

            if self.next_action[i] <= 0 && !snapshot.recovering {
                if snapshot.using {
                    if let Err(e) = handle.quit_critical_section() {
                        debug!(node = handle.number(), error = %e, "quit rejected");
                    }
                    self.next_action[i] =
                        self.rng.gen_range(0..self.config.action_after_quit_max) as i64;
                } else if !snapshot.iasked {
                    if let Err(e) = handle.enter_critical_section() {
                        debug!(node = handle.number(), error = %e, "enter rejected");
                    }
                    self.next_action[i] =
                        self.rng.gen_range(0..self.config.action_after_enter_max) as i64;
                }
            }
        }
    }
}

/// Periodically log a one-line summary of the whole cluster.
pub fn spawn_observer(
    handles: Vec<NodeHandle>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshots: Vec<_> = handles.iter().map(|h| h.snapshot()).collect();
            let root = snapshots
                .iter()
                .find(|s| s.holder == Holder::Local)
                .map(|s| s.number);
            let user = snapshots.iter().find(|s| s.using).map(|s| s.number);
            let recovering = snapshots.iter().filter(|s| s.recovering).count();
            let queued: usize = snapshots.iter().map(|s| s.queue.len()).sum();

            info!(?root, ?user, recovering, queued, "cluster state");
        }
    })
}
