//! Label store — resolves label names to ids, creating missing labels.
//!
//! Resolution is list-then-create against the mailbox, which is racy across
//! processes. Within one process the resolved id is cached and resolvers are
//! serialised, so a name is created at most once per process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, NewLabel};

pub struct LabelStore {
    mailbox: Arc<dyn Mailbox>,
    resolved: Mutex<HashMap<String, String>>,
}

impl LabelStore {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Label id for `name`, creating the label with default visibility if
    /// no label with exactly that name exists.
    pub async fn resolve(&self, name: &str) -> Result<String, MailboxError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(id) = resolved.get(name) {
            return Ok(id.clone());
        }

        let existing = self
            .mailbox
            .list_labels()
            .await?
            .into_iter()
            .find(|l| l.name == name);

        let id = match existing {
            Some(label) => {
                debug!(label = name, id = %label.id, "Found existing label");
                label.id
            }
            None => {
                let label = self.mailbox.create_label(&NewLabel::visible(name)).await?;
                info!(label = name, id = %label.id, "Created label");
                label.id
            }
        };

        resolved.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Drop the cached id for `name`; the next [`resolve`](Self::resolve) asks the mailbox again.
    pub async fn forget(&self, name: &str) {
        if let Some(id) = self.resolved.lock().await.remove(name) {
            debug!(label = name, id = %id, "Forgot cached label id");
        }
    }
}
