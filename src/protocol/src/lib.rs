//! # Treelock Protocol
//!
//! Tree-structured distributed mutual exclusion with crash recovery.
//!
//! ## Architecture
//!
//! Nodes form an undirected tree and exchange five message kinds with their
//! direct neighbours. Normal operation follows the token-on-a-tree scheme:
//!
//! 1. **INITIALIZE**: node 0 roots itself and floods the orientation.
//! 2. **REQUEST**: a node with local demand asks its current holder.
//! 3. **PRIVILEGE**: the token travels one edge toward the head requester.
//!
//! Each node keeps only a direction (`holder`), a duplicate-free FIFO of
//! pending requesters, and an `asked` bit that bounds outstanding requests
//! to one per edge.
//!
//! ## Crash recovery
//!
//! A crashed node wipes its state, waits out a quiescence interval, and
//! interrogates its neighbours:
//!
//! 4. **RESTART**: "tell me what you know about our shared edge."
//! 5. **ADVISE**: one of four codes combining the responder's token
//!    direction with the pending-request bit for the edge.
//!
//! Reducing the full set of answers re-derives `holder`, `asked`, and the
//! request queue; if no neighbour claims the token, the crashed node was
//! the root and regenerates it locally.

pub mod engine;
pub mod error;
pub mod message;
pub mod metrics;
pub mod recovery;
pub mod state;

pub use engine::{ProtocolEngine, BOOTSTRAP_NODE};
pub use error::{ProtocolError, Result};
pub use message::{AdviseCode, Envelope, Message, Payload};
pub use metrics::ProtocolMetrics;
pub use state::{Holder, NodeSnapshot, NodeState, RequestQueue};
