//! Error types shared across the workspace

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Unknown node id: {0}")]
    UnknownNode(u32),

    #[error("No mailbox registered under '{0}'")]
    MailboxNotFound(String),

    #[error("Mailbox '{0}' is already registered")]
    MailboxTaken(String),

    #[error("Mailbox '{0}' is closed")]
    MailboxClosed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
