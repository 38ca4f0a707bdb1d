//! Mail transport boundary.
//!
//! The inbox cycle only talks to these traits. `email` provides the IMAP/SMTP
//! implementation; tests substitute in-memory mailboxes.

pub mod email;
pub mod email_types;

pub use email::{EmailConfig, ImapMailbox, SmtpMailer};

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::pipeline::types::OutgoingMail;

/// A mailbox that can be connected to for one cycle.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Server name for logs and errors.
    fn server(&self) -> &str;

    /// Open an authenticated session on the inbox.
    ///
    /// Failure here is a `MailboxError::Connection` and aborts the cycle.
    async fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// An open mailbox session, exclusively owned by one cycle.
#[async_trait]
pub trait MailboxSession: Send {
    /// Identifiers of unread messages, in mailbox order.
    async fn list_unread(&mut self) -> Result<Vec<String>, MailboxError>;

    /// Raw RFC 822 bytes of a message. Must not mark it as read.
    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError>;

    /// Flag a message as read so later cycles skip it.
    async fn mark_seen(&mut self, id: &str) -> Result<(), MailboxError>;

    /// Close the session. Called exactly once, on every exit path of a cycle.
    async fn disconnect(&mut self) -> Result<(), MailboxError>;
}

/// Outbound mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError>;
}
