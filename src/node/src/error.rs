//! Error types for the node runtime

use thiserror::Error;
use treelock_core::NodeId;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error(
        "enter rejected on node {node}: iasked={iasked} recovering={recovering} using={using}"
    )]
    EnterRejected {
        node: NodeId,
        iasked: bool,
        recovering: bool,
        using: bool,
    },

    #[error("quit rejected on node {node}: not inside the critical section")]
    QuitRejected { node: NodeId },

    #[error("node {0} is no longer running")]
    Stopped(NodeId),
}
