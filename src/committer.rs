//! Reply committer — sends the canned reply and marks the thread.
//!
//! Send and label are separate remote calls with no transaction between
//! them. The send is the write that matters; the label is the dedup fence
//! for later polls. [`CommitError::Label`] reports the window in between:
//! the reply is out but the thread is unmarked.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CommitError, MailboxError};
use crate::labels::LabelStore;
use crate::mailbox::{LabelModification, Mailbox};
use crate::mime;

/// What a successful commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub sent_id: String,
    /// Thread label set after the marker was applied.
    pub thread_labels: Vec<String>,
}

pub struct ReplyCommitter {
    mailbox: Arc<dyn Mailbox>,
    labels: Arc<LabelStore>,
    reply_from: String,
    reply_text: String,
    replied_label: String,
}

impl ReplyCommitter {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        labels: Arc<LabelStore>,
        reply_from: impl Into<String>,
        reply_text: impl Into<String>,
        replied_label: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            labels,
            reply_from: reply_from.into(),
            reply_text: reply_text.into(),
            replied_label: replied_label.into(),
        }
    }

    /// Reply to `reply_to` inside `thread_id`, then add the replied marker.
    pub async fn commit(
        &self,
        thread_id: &str,
        original_subject: &str,
        reply_to: &str,
    ) -> Result<CommitReceipt, CommitError> {
        let subject = mime::reply_subject(original_subject);
        let raw = mime::compose_reply(&self.reply_from, reply_to, &subject, &self.reply_text)?;

        let sent_id = self
            .mailbox
            .send_message(&mime::encode_raw(&raw), Some(thread_id))
            .await
            .map_err(CommitError::Send)?;
        info!(thread_id, sent_id = %sent_id, to = reply_to, subject = %subject, "Reply sent");

        let thread_labels = match self.apply_marker(thread_id).await {
            Ok(labels) => labels,
            Err(source) => {
                warn!(thread_id, sent_id = %sent_id, error = %source, "Reply sent but thread not labeled");
                return Err(CommitError::Label { sent_id, source });
            }
        };
        info!(thread_id, label = %self.replied_label, "Thread labeled as replied");

        Ok(CommitReceipt {
            sent_id,
            thread_labels,
        })
    }

    async fn apply_marker(&self, thread_id: &str) -> Result<Vec<String>, MailboxError> {
        let label_id = self.labels.resolve(&self.replied_label).await?;
        match self
            .mailbox
            .modify_thread(thread_id, &LabelModification::add(&label_id))
            .await
        {
            // The cached id is stale when the label was deleted from the mailbox.
            Err(MailboxError::Api { status: 400 | 404, .. }) => {
                warn!(label = %self.replied_label, id = %label_id, "Marker label rejected, resolving it again");
                self.labels.forget(&self.replied_label).await;
                let label_id = self.labels.resolve(&self.replied_label).await?;
                self.mailbox
                    .modify_thread(thread_id, &LabelModification::add(label_id))
                    .await
            }
            other => other,
        }
    }
}
