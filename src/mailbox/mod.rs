//! Remote mailbox abstraction.
//!
//! The responder only talks to the mail service through the [`Mailbox`]
//! trait. [`gmail::GmailClient`] is the production implementation; tests
//! drive the responder with in-memory fakes.

pub mod gmail;
pub mod types;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use gmail::GmailClient;
pub use types::*;

/// Operations the responder needs from the remote mail service.
///
/// Implementations are assumed to be authenticated already.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List message references matching `query`, most recent first.
    ///
    /// Follows pagination until `max_results` references are collected or
    /// the result set is exhausted.
    async fn list_messages(
        &self,
        query: &str,
        label_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError>;

    /// Fetch one message with headers, body and labels.
    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError>;

    /// Fetch a thread with its messages, oldest first.
    async fn get_thread(&self, id: &str) -> Result<MailThread, MailboxError>;

    /// Send a base64url-encoded RFC 2822 message into `thread_id`.
    /// Returns the id of the sent message.
    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<String, MailboxError>;

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError>;

    async fn create_label(&self, label: &NewLabel) -> Result<Label, MailboxError>;

    /// Add/remove labels on every message of a thread.
    /// Returns the thread's label set afterwards.
    async fn modify_thread(
        &self,
        id: &str,
        change: &LabelModification,
    ) -> Result<Vec<String>, MailboxError>;
}
