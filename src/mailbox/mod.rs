//! Mailbox collaborators: where candidate messages come from and where
//! labels go.

pub mod gmail;
pub mod memory;

pub use gmail::{GmailAuth, GmailConfig, GmailMailbox};
pub use memory::MemoryMailbox;
