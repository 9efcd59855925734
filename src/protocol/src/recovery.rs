//! Crash handling and the advise-based recovery handshake
//!
//! A crashed node loses every protocol variable. It interrogates its
//! neighbours with RESTART; each answers with one ADVISE code describing
//! the shared edge from its side, and the reduction of those answers
//! re-derives `holder`, `asked`, and the request queue. The global tree
//! invariant guarantees at most one neighbour reports the token on its own
//! side; observing two means the topology itself is corrupt and the node
//! aborts.

use crate::engine::ProtocolEngine;
use crate::error::{ProtocolError, Result};
use crate::message::{AdviseCode, Payload};
use crate::state::Holder;
use tracing::{debug, info, warn};
use treelock_core::NodeId;

impl ProtocolEngine {
    /// Wipe the protocol variables and enter recovery.
    ///
    /// The owner of the engine is responsible for the quiescence wait (long
    /// enough that every in-flight message addressed to this node has been
    /// delivered and discarded) and for calling [`broadcast_restart`]
    /// afterwards.
    ///
    /// [`broadcast_restart`]: ProtocolEngine::broadcast_restart
    pub fn crash(&mut self) {
        self.state.holder = Holder::Unknown;
        self.state.using = false;
        self.state.asked = false;
        self.state.iasked = false;
        self.state.request_q.clear();
        self.state.advise_answers.clear();
        self.state.recovering = true;
        self.take_outbox();

        self.metrics.crashes.inc();
        self.metrics.queue_depth.set(0);
        warn!(node = self.number(), "crashed; protocol state wiped");
    }

    /// Ask every neighbour what it knows about our shared edge.
    ///
    /// A node with no neighbours has nobody to ask and recovers on the
    /// spot as its own root.
    pub fn broadcast_restart(&mut self) -> Result<()> {
        if self.state.neighbors.is_empty() {
            return self.finish_recovery();
        }
        for n in self.state.neighbors.clone() {
            self.send(n, Payload::Restart);
        }
        Ok(())
    }

    /// Answer a neighbour's RESTART with the code describing our side of
    /// the shared edge. Stateless, so a repeated RESTART gets a consistent
    /// fresh answer.
    pub(crate) fn on_restart(&mut self, sender: NodeId) {
        let code = if self.state.holder == Holder::Neighbor(sender) {
            if self.state.asked {
                AdviseCode::TowardYouAsked
            } else {
                AdviseCode::TowardYouIdle
            }
        } else if self.state.request_q.contains(sender) {
            AdviseCode::AwayFromYouQueued
        } else {
            AdviseCode::AwayFromYou
        };

        debug!(node = self.number(), restarter = sender, code = %code, "advising");
        self.send(sender, Payload::Advise(code));
    }

    /// Collect one ADVISE answer; once every neighbour has answered, reduce
    /// them into a consistent local state.
    pub(crate) fn on_advise(&mut self, sender: NodeId, code: AdviseCode) -> Result<()> {
        if !self.state.recovering {
            warn!(node = self.number(), sender, "stray ADVISE; not recovering");
            self.metrics.frames_discarded.inc();
            return Ok(());
        }
        if self.state.advise_answers.iter().any(|&(n, _)| n == sender) {
            warn!(node = self.number(), sender, "duplicate ADVISE; keeping first");
            self.metrics.frames_discarded.inc();
            return Ok(());
        }

        self.state.advise_answers.push((sender, code));
        if self.state.advise_answers.len() == self.state.neighbors.len() {
            self.finish_recovery()?;
        }
        Ok(())
    }

    fn finish_recovery(&mut self) -> Result<()> {
        let answers = std::mem::take(&mut self.state.advise_answers);

        let away: Vec<(NodeId, AdviseCode)> = answers
            .iter()
            .copied()
            .filter(|&(_, code)| code.points_away())
            .collect();

        match away.as_slice() {
            [] => {
                // Every neighbour points at us: we were the root, the token
                // (possibly lost in flight) is regenerated here.
                self.state.holder = Holder::Local;
                self.state.asked = false;
            }
            &[(n, code)] => {
                self.state.holder = Holder::Neighbor(n);
                self.state.asked = code == AdviseCode::AwayFromYouQueued;
            }
            &[(a, _), (b, _), ..] => {
                return Err(ProtocolError::TopologyCorrupted(a, b));
            }
        }

        // Neighbours whose open REQUEST to us the crash wiped out; they will
        // not re-send while their own `asked` stays true, so requeue them in
        // the order the answers arrived.
        for (n, code) in answers {
            if code == AdviseCode::TowardYouAsked {
                self.state.request_q.push(n);
            }
        }

        self.state.recovering = false;
        self.metrics.recoveries.inc();
        self.metrics.queue_depth.set(self.state.request_q.len() as i64);
        info!(
            node = self.number(),
            holder = ?self.state.holder,
            asked = self.state.asked,
            queued = self.state.request_q.len(),
            "recovery complete"
        );

        self.assign_privilege();
        self.make_request();
        Ok(())
    }
}
