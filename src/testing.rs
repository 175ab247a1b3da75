//! In-memory mailbox for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AuthError, MailboxError};
use crate::mailbox::{
    Label, LabelModification, MailMessage, MailThread, Mailbox, MessageRef, NewLabel,
};
use crate::mime;

/// Which call should fail, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transient,
    Auth,
}

impl Failure {
    fn error(self, operation: &'static str) -> MailboxError {
        match self {
            Failure::Transient => MailboxError::Api {
                operation,
                status: 503,
                body: "backend error".into(),
            },
            Failure::Auth => MailboxError::Auth(AuthError::RefreshRejected("invalid_grant".into())),
        }
    }
}

/// A reply captured by [`FakeMailbox::send_message`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub id: String,
    pub thread_id: Option<String>,
    /// Decoded RFC 2822 text.
    pub raw: String,
}

#[derive(Default)]
struct State {
    inbox: Vec<MailMessage>,
    labels: Vec<Label>,
    sent: Vec<SentMail>,
    queries: Vec<String>,
    label_creates: usize,
    fail_list: Option<Failure>,
    fail_send: Option<Failure>,
    fail_modify: Option<Failure>,
}

/// Returns every inbox message for any query, newest first, the way a
/// loose server-side `from:` match might.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<State>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, id: &str, thread_id: &str, from: &str, subject: &str, at: DateTime<Utc>) {
        self.state.lock().unwrap().inbox.push(MailMessage {
            id: id.into(),
            thread_id: thread_id.into(),
            from_header: from.into(),
            sender: mime::parse_address(from),
            subject: subject.into(),
            body_text: "hello".into(),
            label_ids: vec!["INBOX".into()],
            received_at: at,
        });
    }

    /// Replace the parsed sender of a delivered message.
    pub fn override_sender(&self, message_id: &str, sender: &str) {
        let mut state = self.state.lock().unwrap();
        for m in state.inbox.iter_mut().filter(|m| m.id == message_id) {
            m.sender = sender.into();
        }
    }

    /// Delete a label, removing it from every message as the mail service does.
    pub fn remove_label(&self, label_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.labels.retain(|l| l.id != label_id);
        for m in state.inbox.iter_mut() {
            m.label_ids.retain(|l| l != label_id);
        }
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(Label {
            id: id.into(),
            name: name.into(),
        });
    }

    /// Put `label_id` on every message of `thread_id`.
    pub fn label_thread(&self, thread_id: &str, label_id: &str) {
        let mut state = self.state.lock().unwrap();
        for m in state.inbox.iter_mut().filter(|m| m.thread_id == thread_id) {
            if !m.label_ids.iter().any(|l| l == label_id) {
                m.label_ids.push(label_id.into());
            }
        }
    }

    pub fn thread_labels(&self, thread_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut labels: Vec<String> = Vec::new();
        for m in state.inbox.iter().filter(|m| m.thread_id == thread_id) {
            for l in &m.label_ids {
                if !labels.contains(l) {
                    labels.push(l.clone());
                }
            }
        }
        labels
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn label_creates(&self) -> usize {
        self.state.lock().unwrap().label_creates
    }

    pub fn fail_list(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_list = failure;
    }

    pub fn fail_send(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_send = failure;
    }

    pub fn fail_modify(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_modify = failure;
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_messages(
        &self,
        query: &str,
        _label_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        if let Some(f) = state.fail_list {
            return Err(f.error("list_messages"));
        }
        let mut inbox = state.inbox.clone();
        inbox.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(inbox
            .into_iter()
            .take(max_results)
            .map(|m| MessageRef {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        let state = self.state.lock().unwrap();
        state
            .inbox
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailboxError::NotFound {
                entity: "message",
                id: id.to_string(),
            })
    }

    async fn get_thread(&self, id: &str) -> Result<MailThread, MailboxError> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<MailMessage> = state
            .inbox
            .iter()
            .filter(|m| m.thread_id == id)
            .cloned()
            .collect();
        if messages.is_empty() {
            return Err(MailboxError::NotFound {
                entity: "thread",
                id: id.to_string(),
            });
        }
        messages.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(MailThread {
            id: id.to_string(),
            messages,
        })
    }

    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<String, MailboxError> {
        let mut state = self.state.lock().unwrap();
        if let Some(f) = state.fail_send {
            return Err(f.error("send_message"));
        }
        let id = format!("sent-{}", state.sent.len() + 1);
        state.sent.push(SentMail {
            id: id.clone(),
            thread_id: thread_id.map(str::to_string),
            raw: mime::decode_base64url(raw).unwrap_or_default(),
        });
        Ok(id)
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, label: &NewLabel) -> Result<Label, MailboxError> {
        let mut state = self.state.lock().unwrap();
        state.label_creates += 1;
        let created = Label {
            id: format!("Label_{}", 100 + state.label_creates),
            name: label.name.clone(),
        };
        state.labels.push(created.clone());
        Ok(created)
    }

    async fn modify_thread(
        &self,
        id: &str,
        change: &LabelModification,
    ) -> Result<Vec<String>, MailboxError> {
        {
            let state = self.state.lock().unwrap();
            if let Some(f) = state.fail_modify {
                return Err(f.error("modify_thread"));
            }
            let unknown = change
                .add_label_ids
                .iter()
                .find(|id| !state.labels.iter().any(|l| &l.id == *id));
            if let Some(id) = unknown {
                return Err(MailboxError::Api {
                    operation: "modify_thread",
                    status: 400,
                    body: format!("Invalid label: {id}"),
                });
            }
        }
        for label in &change.add_label_ids {
            self.label_thread(id, label);
        }
        Ok(self.thread_labels(id))
    }
}
