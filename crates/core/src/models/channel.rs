//! Channel model - a named, persistent chat room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum channel name length
pub const MAX_CHANNEL_NAME_LEN: usize = 50;

/// A Channel is a persistent chat room with a creator and visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    /// Unique, lowercase, charset `[a-z0-9-_]`
    pub name: String,
    pub description: String,
    pub creator_id: Uuid,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    /// Updated whenever a message is posted; orders channel lists
    pub last_activity: DateTime<Utc>,
}

impl Channel {
    pub fn new(name: String, description: String, creator_id: Uuid, is_private: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            creator_id,
            is_private,
            created_at: now,
            last_activity: now,
        }
    }

    /// Validate a channel name: non-empty, at most 50 chars, lowercase
    /// `[a-z0-9-_]` only.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidInput("channel name must not be empty".into()));
        }
        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "channel name must be at most {} characters",
                MAX_CHANNEL_NAME_LEN
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(Error::InvalidInput(
                "channel name may only contain lowercase letters, digits, '-' and '_'".into(),
            ));
        }
        Ok(())
    }
}

/// Channel search result with activity annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub last_activity: DateTime<Utc>,
    /// Content of the most recent message, if any
    pub latest_message: Option<String>,
    /// Messages posted in the last 24 hours
    pub recent_message_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["general", "dev-team", "x", "room_2", "a-b_c3"] {
            assert!(Channel::validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "General", "has space", "émoji", "semi;colon", "dot.name"] {
            assert!(Channel::validate_name(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn test_overlong_name_rejected() {
        let name = "a".repeat(MAX_CHANNEL_NAME_LEN + 1);
        assert!(Channel::validate_name(&name).is_err());
    }
}
