//! Error types for Palaver Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Join already requested")]
    AlreadyRequested,

    #[error("Already a member")]
    AlreadyMember,

    #[error("Name already taken")]
    NameConflict,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code carried in error acknowledgments.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "internal",
            Error::Authentication(_) => "authentication",
            Error::ChannelNotFound => "channel_not_found",
            Error::MessageNotFound => "message_not_found",
            Error::UserNotFound => "user_not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotAuthorized(_) => "not_authorized",
            Error::AlreadyRequested => "already_requested",
            Error::AlreadyMember => "already_member",
            Error::NameConflict => "name_conflict",
            Error::Io(_) => "internal",
            Error::Serialization(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
