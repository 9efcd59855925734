//! Normal-operation mutual-exclusion engine
//!
//! One `ProtocolEngine` is owned by exactly one event-loop task. Handlers
//! are synchronous and never suspend; outbound messages accumulate in an
//! outbox the owner drains after each event. The two internal procedures,
//! `assign_privilege` and `make_request`, are re-run after every relevant
//! state change and are idempotent under their preconditions, so the order
//! of the pair never matters.

use crate::error::Result;
use crate::message::{Envelope, Message, Payload};
use crate::metrics::ProtocolMetrics;
use crate::state::{Holder, NodeSnapshot, NodeState};
use std::sync::Arc;
use tracing::{debug, info, warn};
use treelock_core::NodeId;

/// The node that seeds the initial tree orientation.
pub const BOOTSTRAP_NODE: NodeId = 0;

/// Per-node protocol state machine.
pub struct ProtocolEngine {
    pub(crate) state: NodeState,
    pub(crate) metrics: Arc<ProtocolMetrics>,
    outbox: Vec<Envelope>,
}

impl ProtocolEngine {
    pub fn new(number: NodeId, neighbors: Vec<NodeId>, metrics: Arc<ProtocolMetrics>) -> Self {
        Self {
            state: NodeState::new(number, neighbors),
            metrics,
            outbox: Vec::new(),
        }
    }

    pub fn number(&self) -> NodeId {
        self.state.number
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.state.neighbors
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.state.snapshot()
    }

    /// Drain every message queued by the last handled event.
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Seed the tree orientation. Node 0 roots itself and floods
    /// INITIALIZE; every other node waits for the flood to reach it.
    pub fn bootstrap(&mut self) {
        if self.state.number != BOOTSTRAP_NODE {
            return;
        }
        self.state.holder = Holder::Local;
        for n in self.state.neighbors.clone() {
            self.send(n, Payload::Initialize);
        }
        info!(node = self.state.number, "seeded tree orientation");
    }

    /// Dispatch one inbound message.
    ///
    /// Only a detected invariant violation is an error; everything else a
    /// misbehaving peer could send is logged and discarded here.
    pub fn handle_message(&mut self, msg: Message) -> Result<()> {
        if !self.state.is_neighbor(msg.sender) {
            warn!(
                node = self.state.number,
                sender = msg.sender,
                kind = msg.payload.kind(),
                "discarding message from non-neighbour"
            );
            self.metrics.frames_discarded.inc();
            return Ok(());
        }

        if self.state.recovering && !matches!(msg.payload, Payload::Advise(_)) {
            debug!(
                node = self.state.number,
                sender = msg.sender,
                kind = msg.payload.kind(),
                "recovering; discarding"
            );
            self.metrics.frames_discarded.inc();
            return Ok(());
        }

        match msg.payload {
            Payload::Initialize => self.on_initialize(msg.sender),
            Payload::Request => self.on_request(msg.sender),
            Payload::Privilege => self.on_privilege(msg.sender),
            Payload::Restart => self.on_restart(msg.sender),
            Payload::Advise(code) => self.on_advise(msg.sender, code)?,
        }

        self.metrics.queue_depth.set(self.state.request_q.len() as i64);
        Ok(())
    }

    /// Local workload hook: queue ourselves for the critical section.
    ///
    /// Re-validates the driver-side guard; a rejected call is driver misuse
    /// and is ignored. Returns whether the request was admitted.
    pub fn enter_cs(&mut self) -> bool {
        if self.state.iasked || self.state.recovering || self.state.using {
            warn!(
                node = self.state.number,
                iasked = self.state.iasked,
                recovering = self.state.recovering,
                using = self.state.using,
                "enter_critical_section rejected"
            );
            self.metrics.driver_rejections.inc();
            return false;
        }

        self.state.iasked = true;
        self.state.request_q.push(self.state.number);
        self.assign_privilege();
        self.make_request();
        self.metrics.queue_depth.set(self.state.request_q.len() as i64);
        true
    }

    /// Local workload hook: leave the critical section.
    pub fn quit_cs(&mut self) -> bool {
        if !self.state.using {
            warn!(node = self.state.number, "quit_critical_section while not using");
            self.metrics.driver_rejections.inc();
            return false;
        }

        self.state.using = false;
        info!(node = self.state.number, "left critical section");
        self.assign_privilege();
        self.make_request();
        self.metrics.queue_depth.set(self.state.request_q.len() as i64);
        true
    }

    fn on_initialize(&mut self, sender: NodeId) {
        self.state.holder = Holder::Neighbor(sender);
        self.state.request_q.clear();
        self.state.using = false;
        self.state.asked = false;
        for n in self.state.neighbors.clone() {
            if n != sender {
                self.send(n, Payload::Initialize);
            }
        }
        debug!(node = self.state.number, holder = sender, "oriented toward root");
        self.assign_privilege();
        self.make_request();
    }

    fn on_request(&mut self, sender: NodeId) {
        if !self.state.request_q.push(sender) {
            warn!(
                node = self.state.number,
                sender, "duplicate REQUEST; already queued"
            );
        }
        self.assign_privilege();
        self.make_request();
    }

    fn on_privilege(&mut self, sender: NodeId) {
        debug!(node = self.state.number, from = sender, "received privilege");
        self.state.holder = Holder::Local;
        self.assign_privilege();
        self.make_request();
    }

    /// Grant the token to the head of the queue when we hold it and are not
    /// inside the critical section ourselves.
    pub(crate) fn assign_privilege(&mut self) {
        if self.state.recovering || !self.state.holder.is_local() || self.state.using {
            return;
        }
        let Some(next) = self.state.request_q.pop() else {
            return;
        };

        self.state.asked = false;
        if next == self.state.number {
            self.state.using = true;
            self.state.iasked = false;
            self.metrics.cs_entries.inc();
            info!(node = self.state.number, "entered critical section");
        } else {
            self.state.holder = Holder::Neighbor(next);
            self.send(next, Payload::Privilege);
        }
    }

    /// Ask the holder for the token when someone is queued here and no
    /// REQUEST of ours is already outstanding.
    pub(crate) fn make_request(&mut self) {
        if self.state.recovering || self.state.asked || self.state.request_q.is_empty() {
            return;
        }
        let Holder::Neighbor(holder) = self.state.holder else {
            return;
        };

        self.send(holder, Payload::Request);
        self.state.asked = true;
    }

    pub(crate) fn send(&mut self, to: NodeId, payload: Payload) {
        match payload {
            Payload::Request => self.metrics.requests_sent.inc(),
            Payload::Privilege => self.metrics.privileges_sent.inc(),
            Payload::Restart => self.metrics.restarts_sent.inc(),
            Payload::Advise(_) => self.metrics.advises_sent.inc(),
            Payload::Initialize => {}
        }
        self.outbox.push(Envelope {
            to,
            message: Message::new(self.state.number, payload),
        });
    }
}
