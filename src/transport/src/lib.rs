//! # Treelock Transport
//!
//! In-process transport for the mutual-exclusion network: every node owns a
//! named inbound mailbox (`node_<id>`), and senders address mailboxes by
//! name. Delivery is reliable, exactly-once, and FIFO per ordered sender
//! pair, which is all the protocol requires of its wire.

pub mod mailbox;

pub use mailbox::MailboxRouter;
