//! Error types for the canned-reply responder.

/// Top-level error type for the responder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),
}

impl Error {
    /// Whether the poll loop must stop instead of retrying on the next tick.
    ///
    /// Only credential failures are fatal; everything else is treated as a
    /// transient service error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Auth(e) => !e.is_transient(),
            Error::Mailbox(e) => e.is_auth(),
            Error::Commit(CommitError::Send(e)) => e.is_auth(),
            Error::Commit(CommitError::Label { source, .. }) => source.is_auth(),
            Error::Commit(CommitError::Compose(_)) => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential errors. Fatal unless the token endpoint merely could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No OAuth token at {path}: {hint}")]
    MissingToken { path: String, hint: String },

    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Token endpoint unavailable: {0}")]
    Http(String),

    #[error("OAuth consent failed: {0}")]
    Consent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Network failures and 5xx/429 from the token endpoint; retried next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Http(_))
    }
}

/// Remote mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("{operation} failed ({status}): {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected response from {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl MailboxError {
    /// True when the failure is a credential problem rather than a transient one.
    pub fn is_auth(&self) -> bool {
        match self {
            MailboxError::Auth(e) => !e.is_transient(),
            MailboxError::Api { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MailboxError {
    fn from(e: reqwest::Error) -> Self {
        MailboxError::Http(e.to_string())
    }
}

/// Reply commit errors.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("Failed to build reply: {0}")]
    Compose(String),

    #[error("Failed to send reply: {0}")]
    Send(#[source] MailboxError),

    /// The reply went out but the thread could not be marked.
    #[error("Reply {sent_id} sent but labeling failed: {source}")]
    Label {
        sent_id: String,
        #[source]
        source: MailboxError,
    },
}

/// Result type alias for the responder.
pub type Result<T> = std::result::Result<T, Error>;
