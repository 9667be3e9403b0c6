//! Message storage operations

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Message, MessageDisplay};

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new message
    pub fn create(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, channel_id, sender_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.to_string(),
                message.channel_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.sent_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get message by ID
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, channel_id, sender_id, content, sent_at FROM messages WHERE id = ?1",
        )?;

        let message = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(Message {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    channel_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    sender_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    content: row.get(3)?,
                    sent_at: parse_datetime(&row.get::<_, String>(4)?)?,
                })
            })
            .optional()?;

        Ok(message)
    }

    /// The most recent `limit` messages for a channel with sender info,
    /// oldest first.
    ///
    /// Fetches newest-first then reverses, so the limit applies to the
    /// tail of the history.
    pub fn list_recent(&self, channel_id: Uuid, limit: u32) -> Result<Vec<MessageDisplay>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.channel_id, m.sender_id, u.username, m.content, m.sent_at
             FROM messages m
             INNER JOIN users u ON u.id = m.sender_id
             WHERE m.channel_id = ?1
             ORDER BY m.sent_at DESC
             LIMIT ?2",
        )?;

        let mut messages: Vec<MessageDisplay> = stmt
            .query_map(params![channel_id.to_string(), limit], |row| {
                Ok(MessageDisplay {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    channel_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    sender_id: parse_uuid(&row.get::<_, String>(2)?)?,
                    sender_username: row.get(3)?,
                    content: row.get(4)?,
                    sent_at: parse_datetime(&row.get::<_, String>(5)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Reverse to get chronological order
        messages.reverse();
        Ok(messages)
    }

    /// Hard delete a message; the row is gone, no tombstone
    pub fn delete(&self, message_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM messages WHERE id = ?1",
            params![message_id.to_string()],
        )?;
        Ok(())
    }

    /// Message count for a channel
    pub fn count_for_channel(&self, channel_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
            params![channel_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
