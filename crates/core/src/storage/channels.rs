//! Channel storage operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Channel, ChannelSummary};

pub struct ChannelStore<'a> {
    conn: &'a Connection,
}

impl<'a> ChannelStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new channel
    #[instrument(skip(self, channel), fields(channel_name = %channel.name))]
    pub fn create(&self, channel: &Channel) -> Result<()> {
        self.conn.execute(
            "INSERT INTO channels (id, name, description, creator_id, is_private, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                channel.id.to_string(),
                channel.name,
                channel.description,
                channel.creator_id.to_string(),
                channel.is_private as i32,
                channel.created_at.to_rfc3339(),
                channel.last_activity.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find channel by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, creator_id, is_private, created_at, last_activity
             FROM channels WHERE id = ?1",
        )?;

        let channel = stmt
            .query_row(params![id.to_string()], Self::map_channel)
            .optional()?;

        Ok(channel)
    }

    /// Find channel by its unique name
    #[instrument(skip(self))]
    pub fn find_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, creator_id, is_private, created_at, last_activity
             FROM channels WHERE name = ?1",
        )?;

        let channel = stmt.query_row(params![name], Self::map_channel).optional()?;

        Ok(channel)
    }

    fn map_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
        Ok(Channel {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            name: row.get(1)?,
            description: row.get(2)?,
            creator_id: parse_uuid(&row.get::<_, String>(3)?)?,
            is_private: row.get::<_, i32>(4)? != 0,
            created_at: parse_datetime(&row.get::<_, String>(5)?)?,
            last_activity: parse_datetime(&row.get::<_, String>(6)?)?,
        })
    }

    /// Delete a channel.
    ///
    /// Used as the compensating step when the creator's admin membership
    /// cannot be written after channel creation.
    #[instrument(skip(self))]
    pub fn delete(&self, channel_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM channels WHERE id = ?1",
            params![channel_id.to_string()],
        )?;
        Ok(())
    }

    /// Bump last_activity to the given instant
    pub fn touch_activity(&self, channel_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE channels SET last_activity = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), channel_id.to_string()],
        )?;
        Ok(())
    }

    /// List channels the user has any membership in, most recently
    /// active first.
    #[instrument(skip(self))]
    pub fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ChannelSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM channels c
             INNER JOIN memberships m ON m.channel_id = c.id
             WHERE m.user_id = ?2
             ORDER BY c.last_activity DESC",
            SUMMARY_COLUMNS
        ))?;

        let cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let channels = stmt
            .query_map(params![cutoff, user_id.to_string()], Self::map_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(channels)
    }

    /// Case-insensitive substring search over channel names.
    ///
    /// Private channels are only visible to users that already hold a
    /// membership in them. `term` is expected lowercased by the caller;
    /// stored names are lowercase by construction.
    #[instrument(skip(self))]
    pub fn search(&self, term: &str, caller_id: Uuid) -> Result<Vec<ChannelSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM channels c
             WHERE instr(c.name, ?2) > 0
               AND (c.is_private = 0 OR EXISTS (
                    SELECT 1 FROM memberships m
                    WHERE m.channel_id = c.id AND m.user_id = ?3))
             ORDER BY c.last_activity DESC",
            SUMMARY_COLUMNS
        ))?;

        let cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let channels = stmt
            .query_map(
                params![cutoff, term, caller_id.to_string()],
                Self::map_summary,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(channels)
    }

    fn map_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelSummary> {
        Ok(ChannelSummary {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            name: row.get(1)?,
            description: row.get(2)?,
            is_private: row.get::<_, i32>(3)? != 0,
            last_activity: parse_datetime(&row.get::<_, String>(4)?)?,
            latest_message: row.get(5)?,
            recent_message_count: row.get::<_, i64>(6)? as u64,
        })
    }
}

/// Columns shared by the summary queries; `?1` is the 24-hour cutoff.
const SUMMARY_COLUMNS: &str = "c.id, c.name, c.description, c.is_private, c.last_activity,
    (SELECT content FROM messages WHERE channel_id = c.id ORDER BY sent_at DESC LIMIT 1),
    (SELECT COUNT(*) FROM messages WHERE channel_id = c.id AND sent_at > ?1)";
