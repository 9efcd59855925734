//! Named-mailbox router
//!
//! A `DashMap` of mailbox name to the owning node's unbounded inbound
//! channel. Each mailbox channel is FIFO overall, so delivery between any
//! ordered pair of nodes is FIFO as well. A crashed node keeps its mailbox
//! registered and drains it, so in-flight frames addressed to it are
//! delivered and discarded rather than lost in the transport.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use treelock_core::{CoreError, Result, Transport};

/// Registry of per-node inbound mailboxes.
#[derive(Default)]
pub struct MailboxRouter {
    mailboxes: DashMap<String, mpsc::UnboundedSender<String>>,
}

impl MailboxRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a mailbox name and return its receiving end.
    pub fn register(&self, mailbox: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        if self.mailboxes.contains_key(mailbox) {
            return Err(CoreError::MailboxTaken(mailbox.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(mailbox.to_string(), tx);
        debug!(mailbox, "mailbox registered");
        Ok(rx)
    }

    /// Drop a mailbox. Frames sent afterwards fail with `MailboxNotFound`.
    pub fn unregister(&self, mailbox: &str) -> bool {
        self.mailboxes.remove(mailbox).is_some()
    }

    /// Number of registered mailboxes.
    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    /// Enqueue one frame on the named mailbox.
    pub fn deliver(&self, mailbox: &str, frame: String) -> Result<()> {
        let tx = self
            .mailboxes
            .get(mailbox)
            .ok_or_else(|| CoreError::MailboxNotFound(mailbox.to_string()))?;
        tx.send(frame)
            .map_err(|_| CoreError::MailboxClosed(mailbox.to_string()))
    }
}

#[async_trait]
impl Transport for MailboxRouter {
    async fn send(&self, mailbox: &str, frame: String) -> Result<()> {
        self.deliver(mailbox, frame)
    }
}
