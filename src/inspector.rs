//! Thread inspector — loads a candidate message together with its thread.

use tracing::debug;

use crate::error::MailboxError;
use crate::mailbox::{MailMessage, MailThread, Mailbox, MessageRef};

/// One candidate for a reply: the newest matching message and its thread.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub message: MailMessage,
    pub thread: MailThread,
}

/// Fetch the thread first (so it can be labeled), then the message itself.
pub async fn inspect(mailbox: &dyn Mailbox, candidate: &MessageRef) -> Result<Candidate, MailboxError> {
    let thread = mailbox.get_thread(&candidate.thread_id).await?;
    let message = mailbox.get_message(&candidate.id).await?;

    debug!(
        thread_id = %thread.id,
        message_id = %message.id,
        messages = thread.messages.len(),
        labels = ?thread.label_ids(),
        "Inspected thread"
    );

    Ok(Candidate { message, thread })
}
