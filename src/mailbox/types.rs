//! Mailbox domain types — messages, threads, labels.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message id/thread id pair as returned by a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// A fetched message. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: String,
    /// Raw From header, e.g. `Spammer <spammer@mail.com>`.
    pub from_header: String,
    /// Address part of the From header; empty when it could not be parsed.
    pub sender: String,
    pub subject: String,
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
    /// Server-assigned receipt time.
    pub received_at: DateTime<Utc>,
}

/// A conversation thread, messages oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailThread {
    pub id: String,
    pub messages: Vec<MailMessage>,
}

impl MailThread {
    /// Labels currently attached to the thread.
    ///
    /// The union over all messages; a thread without messages has none.
    pub fn label_ids(&self) -> BTreeSet<&str> {
        self.messages
            .iter()
            .flat_map(|m| m.label_ids.iter().map(String::as_str))
            .collect()
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.label_ids.iter().any(|l| l == label_id))
    }
}

/// A mailbox label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Whether a label is shown in the label list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelListVisibility {
    LabelShow,
    LabelShowIfUnread,
    LabelHide,
}

/// Whether labelled messages are shown in the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageListVisibility {
    Show,
    Hide,
}

/// Request body for creating a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabel {
    pub name: String,
    pub label_list_visibility: LabelListVisibility,
    pub message_list_visibility: MessageListVisibility,
}

impl NewLabel {
    /// A label with default (visible) settings.
    pub fn visible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_list_visibility: LabelListVisibility::LabelShow,
            message_list_visibility: MessageListVisibility::Show,
        }
    }
}

/// Labels to add to and remove from a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelModification {
    pub add_label_ids: Vec<String>,
    pub remove_label_ids: Vec<String>,
}

impl LabelModification {
    pub fn add(label_id: impl Into<String>) -> Self {
        Self {
            add_label_ids: vec![label_id.into()],
            remove_label_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, labels: &[&str]) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: "t1".into(),
            from_header: "a@x.com".into(),
            sender: "a@x.com".into(),
            subject: "Hi".into(),
            body_text: String::new(),
            label_ids: labels.iter().map(|s| s.to_string()).collect(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn empty_thread_has_no_labels() {
        let thread = MailThread {
            id: "t1".into(),
            messages: vec![],
        };
        assert!(thread.label_ids().is_empty());
        assert!(!thread.has_label("Label_1"));
    }

    #[test]
    fn thread_labels_are_union_of_messages() {
        let thread = MailThread {
            id: "t1".into(),
            messages: vec![
                message("m1", &["INBOX", "Label_1"]),
                message("m2", &["INBOX", "UNREAD"]),
            ],
        };
        let labels: Vec<&str> = thread.label_ids().into_iter().collect();
        assert_eq!(labels, vec!["INBOX", "Label_1", "UNREAD"]);
        assert!(thread.has_label("Label_1"));
    }

    #[test]
    fn new_label_serializes_gmail_visibility_names() {
        let json = serde_json::to_value(NewLabel::visible("Canned-reply")).unwrap();
        assert_eq!(json["name"], "Canned-reply");
        assert_eq!(json["labelListVisibility"], "labelShow");
        assert_eq!(json["messageListVisibility"], "show");
    }

    #[test]
    fn label_modification_serializes_camel_case() {
        let json = serde_json::to_value(LabelModification::add("Label_7")).unwrap();
        assert_eq!(json["addLabelIds"][0], "Label_7");
        assert!(json["removeLabelIds"].as_array().unwrap().is_empty());
    }
}
