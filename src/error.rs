//! Error types for the bouncer.

/// Top-level error type. Only fatal errors propagate this far; send,
/// delete, and plan failures stay recorded inside `DispatchResult` and
/// `RunSummary`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Configuration-related errors. Fatal — the run aborts before any
/// mail-store access.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// OAuth token/credential acquisition errors. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read token file {path}: {reason}")]
    TokenUnreadable { path: String, reason: String },

    #[error("Failed to read credentials file {path}: {reason}")]
    CredentialsUnreadable { path: String, reason: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Failed to persist refreshed token to {path}: {reason}")]
    PersistFailed { path: String, reason: String },
}

/// Transport-level failure talking to the mail store. Recorded against the
/// sender or message it concerns, non-fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("List failed for {sender}: {reason}")]
    ListFailed { sender: String, reason: String },

    #[error("Fetch failed for message {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Send to {recipient} failed: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("Delete of {id} failed: {reason}")]
    DeleteFailed { id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// A single reply copy failed to send. Recorded, non-fatal; the next
/// scheduled run retries naturally because the original stays in the box.
#[derive(Debug, thiserror::Error)]
#[error("Reply to {recipient} failed (copy {copy}): {reason}")]
pub struct SendError {
    pub recipient: String,
    pub copy: u32,
    pub reason: String,
}

/// A single delete failed. Recorded warning, non-fatal; the item remains in
/// the mailbox for the next invocation.
#[derive(Debug, thiserror::Error)]
#[error("Delete of message {id} failed: {reason}")]
pub struct DeleteError {
    pub id: String,
    pub reason: String,
}

/// Reply planning failed on malformed input.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Message {id} has no sender address")]
    MissingSender { id: String },

    #[error("Message has no id")]
    MissingId,
}

/// Result type alias for the bouncer.
pub type Result<T> = std::result::Result<T, Error>;
