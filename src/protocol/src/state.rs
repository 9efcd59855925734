//! Per-node protocol state
//!
//! The variables here are exactly the per-node bookkeeping of the tree
//! mutual-exclusion algorithm: the token direction, the pending-request
//! FIFO, and the flags guarding duplicate requests and recovery.

use crate::message::AdviseCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use treelock_core::NodeId;

/// Direction along the tree toward the current privilege root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Holder {
    /// Wiped by a crash; only observable while recovering.
    Unknown,
    /// This node is the privilege root.
    Local,
    /// The token lies through this neighbour.
    Neighbor(NodeId),
}

impl Holder {
    pub fn is_local(self) -> bool {
        matches!(self, Holder::Local)
    }

    pub fn neighbor(self) -> Option<NodeId> {
        match self {
            Holder::Neighbor(n) => Some(n),
            _ => None,
        }
    }
}

/// FIFO of requester ids awaiting the token via this node.
///
/// An id appears at most once at any time; pushing a duplicate is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQueue {
    entries: VecDeque<NodeId>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id`, refusing duplicates. Returns whether it was inserted.
    pub fn push(&mut self, id: NodeId) -> bool {
        if self.entries.contains(&id) {
            return false;
        }
        self.entries.push_back(id);
        true
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.entries.pop_front()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.iter()
    }
}

/// The complete mutable state of one node.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// This node's id (immutable).
    pub(crate) number: NodeId,

    /// Direct tree neighbours (immutable).
    pub(crate) neighbors: Vec<NodeId>,

    /// Direction to the current privilege root.
    pub(crate) holder: Holder,

    /// Currently inside the critical section.
    pub(crate) using: bool,

    /// A REQUEST to `holder` is outstanding.
    pub(crate) asked: bool,

    /// This node locally initiated a privilege request that has not yet
    /// resolved. Read by the workload driver to prevent double entry.
    pub(crate) iasked: bool,

    /// Between a crash and the completion of recovery.
    pub(crate) recovering: bool,

    /// Pending requesters, possibly including `number`.
    pub(crate) request_q: RequestQueue,

    /// (neighbour, code) pairs collected during recovery, arrival order.
    pub(crate) advise_answers: Vec<(NodeId, AdviseCode)>,
}

impl NodeState {
    pub fn new(number: NodeId, neighbors: Vec<NodeId>) -> Self {
        Self {
            number,
            neighbors,
            holder: Holder::Unknown,
            using: false,
            asked: false,
            iasked: false,
            recovering: false,
            request_q: RequestQueue::new(),
            advise_answers: Vec::new(),
        }
    }

    pub fn is_neighbor(&self, id: NodeId) -> bool {
        self.neighbors.contains(&id)
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            number: self.number,
            neighbors: self.neighbors.clone(),
            holder: self.holder,
            using: self.using,
            asked: self.asked,
            iasked: self.iasked,
            recovering: self.recovering,
            queue: self.request_q.iter().copied().collect(),
        }
    }
}

/// Read-only view of a node's state, published after every processed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub number: NodeId,
    pub neighbors: Vec<NodeId>,
    pub holder: Holder,
    pub using: bool,
    pub asked: bool,
    pub iasked: bool,
    pub recovering: bool,
    pub queue: Vec<NodeId>,
}
