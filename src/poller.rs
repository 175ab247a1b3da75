//! Poll loop — one candidate per tick, forever.
//!
//! Each tick:
//! 1. List the newest inbox message from an allowed sender
//! 2. Load its thread and the message
//! 3. Decide (freshness → already answered → sender)
//! 4. On reply: send, label the thread, advance the cutoff
//!
//! The cutoff is the only mutable state and lives in [`Responder`]. It starts
//! at process start and moves to "now" after every successful send, so a
//! restart never answers backlog and a sent reply is never repeated for the
//! same message. The thread label is the durable dedup record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::committer::ReplyCommitter;
use crate::config::ResponderConfig;
use crate::decider::{self, SkipReason, Verdict};
use crate::error::{CommitError, Error, Result};
use crate::inspector;
use crate::labels::LabelStore;
use crate::mailbox::Mailbox;
use crate::senders::AllowList;

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing matched the query.
    Idle,
    Skipped {
        thread_id: String,
        message_id: String,
        reason: SkipReason,
    },
    Replied {
        thread_id: String,
        sent_id: String,
    },
    /// Reply sent, but the replied marker could not be applied.
    PartiallyReplied {
        thread_id: String,
        sent_id: String,
    },
}

/// The auto-responder: owns the cutoff and drives one cycle per call.
pub struct Responder {
    mailbox: Arc<dyn Mailbox>,
    labels: Arc<LabelStore>,
    committer: ReplyCommitter,
    allow_list: AllowList,
    query: String,
    replied_label: String,
    cutoff: DateTime<Utc>,
}

impl Responder {
    /// A responder whose cutoff is now: only mail arriving from here on is answered.
    pub fn new(mailbox: Arc<dyn Mailbox>, config: &ResponderConfig) -> Self {
        let labels = Arc::new(LabelStore::new(Arc::clone(&mailbox)));
        let committer = ReplyCommitter::new(
            Arc::clone(&mailbox),
            Arc::clone(&labels),
            config.reply_from.clone(),
            config.reply_text.clone(),
            config.replied_label.clone(),
        );
        Self {
            mailbox,
            labels,
            committer,
            query: config.allowed_senders.inbox_query(),
            allow_list: config.allowed_senders.clone(),
            replied_label: config.replied_label.clone(),
            cutoff: Utc::now(),
        }
    }

    /// Override the starting cutoff.
    pub fn with_cutoff(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Run a single poll cycle.
    ///
    /// Errors abandon the cycle without touching the cutoff, except when the
    /// reply was already sent: then the cutoff still advances.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let refs = self.mailbox.list_messages(&self.query, &[], 1).await?;
        let Some(newest) = refs.into_iter().next() else {
            info!("No messages to show");
            return Ok(PollOutcome::Idle);
        };

        let candidate = inspector::inspect(self.mailbox.as_ref(), &newest).await?;
        let replied_label_id = self.labels.resolve(&self.replied_label).await?;

        let message = &candidate.message;
        let thread_id = candidate.thread.id.clone();
        let verdict = decider::decide(
            message,
            &candidate.thread,
            self.cutoff,
            &self.allow_list,
            &replied_label_id,
        );

        if let Verdict::Skip(reason) = verdict {
            info!(
                thread_id = %thread_id,
                message_id = %message.id,
                sender = %message.sender,
                received_at = %message.received_at,
                cutoff = %self.cutoff,
                reason = reason.label(),
                "Skipping message"
            );
            return Ok(PollOutcome::Skipped {
                thread_id,
                message_id: message.id.clone(),
                reason,
            });
        }

        let committed = self
            .committer
            .commit(&thread_id, &message.subject, &message.from_header)
            .await;
        match committed {
            Ok(receipt) => {
                debug!(thread_id = %thread_id, labels = ?receipt.thread_labels, "Thread labels after commit");
                self.advance_cutoff();
                Ok(PollOutcome::Replied {
                    thread_id,
                    sent_id: receipt.sent_id,
                })
            }
            Err(CommitError::Label { sent_id, source }) => {
                // The send is the write; never let this message trigger a second reply.
                self.advance_cutoff();
                if source.is_auth() {
                    return Err(Error::Commit(CommitError::Label { sent_id, source }));
                }
                warn!(
                    thread_id = %thread_id,
                    sent_id = %sent_id,
                    "Thread left unmarked; a newer message in it may be answered again"
                );
                Ok(PollOutcome::PartiallyReplied { thread_id, sent_id })
            }
            Err(CommitError::Compose(reason)) => {
                // Nothing was sent, and the same message would fail again on every tick.
                self.advance_cutoff();
                warn!(
                    thread_id = %thread_id,
                    message_id = %message.id,
                    from = %message.from_header,
                    "Reply could not be composed; message skipped"
                );
                Err(Error::Commit(CommitError::Compose(reason)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn advance_cutoff(&mut self) {
        let now = Utc::now();
        if now > self.cutoff {
            self.cutoff = now;
        }
        info!(cutoff = %self.cutoff, "Cutoff advanced");
    }

    /// Poll every `interval` until `shutdown` is set or a fatal error occurs.
    pub async fn run(mut self, interval: Duration, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!(
            "Responder started — polling every {}s for {} sender(s)",
            interval.as_secs(),
            self.allow_list.len()
        );

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Responder shutting down");
                return Ok(());
            }

            match self.poll_once().await {
                Ok(PollOutcome::Replied { thread_id, .. }) => {
                    info!(thread_id = %thread_id, "Replied to message");
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!("Fatal error, stopping responder: {e}");
                    return Err(e);
                }
                Err(e) => {
                    error!("Poll failed: {e}");
                }
            }
        }
    }
}

/// Spawn the poll loop on a background task.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_responder(
    responder: Responder,
    interval: Duration,
) -> (JoinHandle<Result<()>>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let handle = tokio::spawn(responder.run(interval, shutdown));
    (handle, shutdown_flag)
}
