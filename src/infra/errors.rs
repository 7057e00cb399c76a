// src/infra/errors.rs — Error types for listbot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Collaborator errors (surfaced to the user as a generic failure)
    #[error("Listing service '{op}' failed: {message}")]
    Listing {
        op: &'static str,
        message: String,
        not_found: bool,
    },

    #[error("Version token rejected by '{op}' (stale etag)")]
    VersionConflict { op: &'static str },

    #[error("Analyzer '{op}' failed: {message}")]
    Analyzer { op: &'static str, message: String },

    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session store error: {0}")]
    Store(String),

    // Every download or upload of a batch failed
    #[error("All {count} items of '{op}' failed")]
    BatchFailed { op: &'static str, count: usize },

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Input(#[from] InputError),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BotError {
    pub fn listing(op: &'static str, message: impl Into<String>) -> Self {
        BotError::Listing {
            op,
            message: message.into(),
            not_found: false,
        }
    }

    pub fn analyzer(op: &'static str, message: impl Into<String>) -> Self {
        BotError::Analyzer {
            op,
            message: message.into(),
        }
    }

    /// Deleting something that is already gone is tolerated by callers.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BotError::Listing {
                not_found: true,
                ..
            }
        )
    }
}

/// Rejected user input. Recovered locally by re-prompting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Could not read a price from '{0}'")]
    Price(String),

    #[error("'{0}' is not a valid postal code")]
    PostalCode(String),

    #[error("'{value}' is not an option for {field}")]
    Choice { field: String, value: String },

    #[error("Please answer yes or no")]
    YesNo,

    #[error("'{0}' is not a valid email address")]
    Email(String),

    #[error("Text must not be empty")]
    Empty,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    #[error("Mailbox closed: actor is shutting down")]
    Closed,

    #[error("Mailbox full: session is falling behind")]
    Full,
}

pub type Result<T> = std::result::Result<T, BotError>;
