//! Responder configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mime;
use crate::senders::AllowList;

/// Gmail REST API root.
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Default seconds between polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default replied-marker label name.
pub const DEFAULT_LABEL: &str = "Canned-reply";

/// Responder configuration. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// From header used on replies, e.g. `Me <me@example.com>`.
    pub reply_from: String,
    /// Senders that get the canned reply.
    pub allowed_senders: AllowList,
    /// Canned reply body.
    pub reply_text: String,
    /// Time between polls.
    pub poll_interval: Duration,
    /// Name of the label marking threads that were already answered.
    pub replied_label: String,
    /// Mailbox user id; `me` is the authenticated account.
    pub user_id: String,
    /// OAuth token file.
    pub token_file: PathBuf,
    /// Google client secret JSON.
    pub client_secret_file: PathBuf,
    pub api_base: String,
    /// Directory for a daily rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl ResponderConfig {
    /// Build config from `RESPONDER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let reply_from = get("RESPONDER_REPLY_FROM").ok_or_else(|| ConfigError::MissingRequired {
            key: "RESPONDER_REPLY_FROM".into(),
            hint: "Set it to the address replies are sent from, e.g. `Me <me@example.com>`".into(),
        })?;
        if !mime::is_valid_mailbox(&reply_from) {
            return Err(ConfigError::InvalidValue {
                key: "RESPONDER_REPLY_FROM".into(),
                message: format!("expected a single mailbox like `Me <me@example.com>`, got {reply_from:?}"),
            });
        }

        let allowed_senders = AllowList::parse(&get("RESPONDER_SENDERS").unwrap_or_default());
        if allowed_senders.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "RESPONDER_SENDERS".into(),
                hint: "Comma-separated list of sender addresses to reply to".into(),
            });
        }

        // Body text keeps its inner whitespace, so read it untrimmed.
        let reply_text = match lookup("RESPONDER_REPLY_TEXT").filter(|v| !v.trim().is_empty()) {
            Some(text) => text,
            None => match get("RESPONDER_REPLY_TEXT_FILE") {
                Some(path) => std::fs::read_to_string(&path)?,
                None => {
                    return Err(ConfigError::MissingRequired {
                        key: "RESPONDER_REPLY_TEXT".into(),
                        hint: "Set the reply body or RESPONDER_REPLY_TEXT_FILE".into(),
                    });
                }
            },
        };

        let poll_interval_secs = match get("RESPONDER_POLL_INTERVAL_SECS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "RESPONDER_POLL_INTERVAL_SECS".into(),
                    message: format!("expected a positive number of seconds, got {raw:?}"),
                }
            })?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let token_file = get("RESPONDER_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_token_file(lookup("HOME")));

        Ok(Self {
            reply_from,
            allowed_senders,
            reply_text,
            poll_interval: Duration::from_secs(poll_interval_secs),
            replied_label: get("RESPONDER_LABEL").unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            user_id: get("RESPONDER_USER_ID").unwrap_or_else(|| "me".to_string()),
            token_file,
            client_secret_file: get("RESPONDER_CLIENT_SECRET_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("client_secret.json")),
            api_base: get("RESPONDER_GMAIL_API_BASE")
                .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string()),
            log_dir: get("RESPONDER_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// `~/.credentials/email-sender-creds.json`
fn default_token_file(home: Option<String>) -> PathBuf {
    let home = home.unwrap_or_else(|| ".".to_string());
    PathBuf::from(home)
        .join(".credentials")
        .join("email-sender-creds.json")
}
