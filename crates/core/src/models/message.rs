//! Message model for channel chat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum message content length in characters
pub const MAX_MESSAGE_LEN: usize = 500;

/// A chat message in a channel.
///
/// Append-only while it exists; deletion is hard (the row is removed,
/// no tombstone is kept).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(channel_id: Uuid, sender_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id,
            sender_id,
            content,
            sent_at: Utc::now(),
        }
    }

    /// Validate message content: non-empty after trimming, at most 500 chars.
    pub fn validate_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("message content must not be empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(Error::InvalidInput(format!(
                "message content must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        Ok(())
    }
}

/// Message with denormalized sender info, as delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDisplay {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_rejected() {
        assert!(Message::validate_content("").is_err());
        assert!(Message::validate_content("   ").is_err());
    }

    #[test]
    fn test_content_length_boundary() {
        let max = "x".repeat(MAX_MESSAGE_LEN);
        assert!(Message::validate_content(&max).is_ok());
        let over = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(Message::validate_content(&over).is_err());
    }
}
