//! Error types for terms-bot.

use crate::session::FlowKind;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No channels enabled: set TELEGRAM_BOT_TOKEN or TERMS_BOT_CLI=true")]
    NoChannels,
}

/// Profile persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store path {0} has no parent directory")]
    InvalidPath(String),
}

/// Document rendering errors.
///
/// A missing field means a flow reached its terminal step with incomplete
/// data, which the session state machine should never allow.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Required field is missing: {field}")]
    MissingField { field: &'static str },

    #[error("No company profile available for rendering")]
    MissingProfile,

    #[error("PDF encoding failed: {0}")]
    Pdf(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Errors returned by the session manager's flow operations.
///
/// Every variant is recoverable: the dispatcher turns each one into a
/// notice for the user.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("User has already completed onboarding")]
    AlreadyOnboarded,

    #[error("User has not completed onboarding")]
    NotOnboarded,

    #[error("No active session for user")]
    NoActiveSession,

    #[error("Session already in progress: {flow}")]
    SessionInProgress { flow: FlowKind },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}
