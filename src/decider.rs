//! Eligibility decider — should this thread get the canned reply?
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. **Freshness** — the message arrived at or after the cutoff.
//! 2. **Already answered** — the thread does not carry the replied marker.
//! 3. **Sender** — the parsed From address is on the allow-list.
//!
//! Freshness rejects most polls in steady state; the sender check runs last
//! because it is the only one that depends on address parsing.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::mailbox::{MailMessage, MailThread};
use crate::senders::AllowList;

/// Why a candidate was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Received before the cutoff (pre-startup or before the last reply).
    TooOld,
    /// Thread already carries the replied-marker label.
    AlreadyReplied,
    /// Sender address is not on the allow-list (or did not parse).
    SenderMismatch,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::TooOld => "too_old",
            SkipReason::AlreadyReplied => "already_replied",
            SkipReason::SenderMismatch => "sender_mismatch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Reply,
    Skip(SkipReason),
}

impl Verdict {
    pub fn is_reply(&self) -> bool {
        matches!(self, Verdict::Reply)
    }
}

/// Decide whether `message` in `thread` gets a reply.
///
/// Pure: the same inputs always give the same verdict.
pub fn decide(
    message: &MailMessage,
    thread: &MailThread,
    cutoff: DateTime<Utc>,
    allow_list: &AllowList,
    replied_label_id: &str,
) -> Verdict {
    if message.received_at < cutoff {
        return Verdict::Skip(SkipReason::TooOld);
    }
    if thread.has_label(replied_label_id) {
        return Verdict::Skip(SkipReason::AlreadyReplied);
    }
    if !allow_list.contains(&message.sender) {
        return Verdict::Skip(SkipReason::SenderMismatch);
    }
    Verdict::Reply
}
