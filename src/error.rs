//! Error types for the bot
//!
//! Every fallible operation in the registry, the rule cache and the sync client
//! reports one of four kinds: not found, conflict, bad request or internal.

use thiserror::Error;

/// Coarse classification of a [`BotError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

/// Errors that can occur while routing events or synchronizing rules
#[derive(Debug, Error)]
pub enum BotError {
    /// No registry entry, no cached rule set, or a rule missing at delete time
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate registration or overlapping rule identity
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed rule or request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Remote call failure or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),

    /// Transport error talking to the persistence service
    #[error("Persistence service error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serenity::Error> for BotError {
    fn from(error: serenity::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl BotError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) | Self::DiscordApi(_) | Self::Http(_) => ErrorKind::Internal,
        }
    }

    /// Wrap any failure coming back from a remote call as an internal error
    #[must_use]
    pub fn into_internal(self) -> Self {
        match self {
            Self::Internal(_) => self,
            other => Self::Internal(other.to_string()),
        }
    }

    /// Short message suitable for an ephemeral reply to the user
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "Nothing matching that was found",
            ErrorKind::Conflict => "Rule on this reaction already exists",
            ErrorKind::BadRequest => "That request is not valid",
            ErrorKind::Internal => "Something went wrong, please try again later",
        }
    }
}

/// Result type for bot operations
pub type BotResult<T> = Result<T, BotError>;
