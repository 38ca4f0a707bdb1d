//! Error types for the inbox router.

use serde::Serialize;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Classification / generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Backend not loaded or not reachable. Never retried by the pipeline.
    #[error("Model {model} unavailable: {reason}")]
    Unavailable { model: String, reason: String },

    #[error("Invalid response from {model}: {reason}")]
    InvalidResponse { model: String, reason: String },
}

impl ModelError {
    pub fn unavailable(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Could not connect, authenticate or select the inbox. Fatal to the cycle.
    #[error("Mailbox connection to {server} failed: {reason}")]
    Connection { server: String, reason: String },

    #[error("Mailbox command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Mailbox IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single message inside a cycle.
///
/// Recorded in that message's outcome; never aborts the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PerMessageError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message has no sender address")]
    MissingSender,

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("reply send failed: {0}")]
    ReplySend(String),

    #[error("forward send failed: {0}")]
    ForwardSend(String),
}

/// Errors from running an inbox cycle through the service.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("An inbox cycle is already running")]
    CycleInProgress,

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}
