//! Error types for protocol operations

use thiserror::Error;
use treelock_core::NodeId;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty wire frame")]
    EmptyFrame,

    #[error("Frame is missing the sender id")]
    MissingSender,

    #[error("Malformed sender id '{0}'")]
    MalformedSender(String),

    #[error("Unknown message kind '{0}'")]
    UnknownKind(String),

    #[error("{kind} frame is missing its payload")]
    MissingPayload { kind: &'static str },

    #[error("Unexpected payload on {kind} frame")]
    UnexpectedPayload { kind: &'static str },

    #[error("Advise code '{0}' outside 1..=4")]
    InvalidAdviseCode(String),

    #[error("Topology corrupted: neighbours {0} and {1} both claim the token lies on their side")]
    TopologyCorrupted(NodeId, NodeId),
}
