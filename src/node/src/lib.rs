//! # Treelock Node
//!
//! The per-node runtime: one tokio task owns the protocol engine and
//! serialises every event (wire frames, driver commands, scheduled exits)
//! through it, one at a time. Also home to the TOML configuration and the
//! synthetic workload driver that exercises a cluster.

pub mod config;
pub mod error;
pub mod node;
pub mod workload;

pub use config::{SimConfig, TopologyShape};
pub use error::{NodeError, Result};
pub use node::{DriverCommand, MutexNode, NodeHandle, NodeRuntimeConfig};
pub use workload::WorkloadDriver;
