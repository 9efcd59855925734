//! Transport layer trait
//!
//! The protocol only needs point-to-point, reliable, FIFO delivery between
//! tree neighbours; everything else about the wire is an external concern.
//! Nodes address each other by mailbox name (see [`crate::mailbox_name`]).

use crate::error::Result;
use async_trait::async_trait;

/// Transport abstraction for node-to-node communication.
///
/// Implementations must deliver frames between any ordered pair of mailboxes
/// in FIFO order, without loss for registered (non-crashed) receivers. A
/// send never blocks the caller's event processing.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one wire frame to the named mailbox.
    async fn send(&self, mailbox: &str, frame: String) -> Result<()>;
}
