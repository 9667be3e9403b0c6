//! Direct-conversation storage operations

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Conversation, DirectMessage};

pub struct ConversationStore<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a conversation row
    #[instrument(skip(self, conversation), fields(conversation_id = %conversation.id))]
    pub fn create(&self, conversation: &Conversation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conversations (id, user_a, user_b, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.user_a.to_string(),
                conversation.user_b.to_string(),
                conversation.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find the conversation for a user pair (order-insensitive)
    #[instrument(skip(self))]
    pub fn find_by_pair(&self, first: Uuid, second: Uuid) -> Result<Option<Conversation>> {
        let (user_a, user_b) = Conversation::ordered_pair(first, second);

        let mut stmt = self.conn.prepare(
            "SELECT id, user_a, user_b, created_at FROM conversations
             WHERE user_a = ?1 AND user_b = ?2",
        )?;

        let conversation = stmt
            .query_row(params![user_a.to_string(), user_b.to_string()], |row| {
                Ok(Conversation {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    user_a: parse_uuid(&row.get::<_, String>(1)?)?,
                    user_b: parse_uuid(&row.get::<_, String>(2)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?)?,
                })
            })
            .optional()?;

        Ok(conversation)
    }

    /// Append a direct message
    pub fn create_message(&self, message: &DirectMessage) -> Result<()> {
        self.conn.execute(
            "INSERT INTO direct_messages (id, conversation_id, sender_id, receiver_id, content, read, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content,
                message.read as i32,
                message.sent_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent `limit` direct messages, oldest first
    pub fn list_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<DirectMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, sender_id, receiver_id, content, read, sent_at
             FROM direct_messages
             WHERE conversation_id = ?1
             ORDER BY sent_at DESC
             LIMIT ?2",
        )?;

        let mut messages: Vec<DirectMessage> = stmt
            .query_map(params![conversation_id.to_string(), limit], |row| {
                Ok(DirectMessage {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    conversation_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    sender_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    receiver_id: parse_uuid(&row.get::<_, String>(3)?)?,
                    content: row.get(4)?,
                    read: row.get::<_, i32>(5)? != 0,
                    sent_at: parse_datetime(&row.get::<_, String>(6)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        messages.reverse();
        Ok(messages)
    }
}
