//! Membership storage operations

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    parse_datetime, parse_datetime_opt, parse_uuid, role_from_u8, status_from_str, OptionalExt,
};
use crate::error::Result;
use crate::models::{ChannelRole, Membership};

pub struct MembershipStore<'a> {
    conn: &'a Connection,
}

impl<'a> MembershipStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a membership row.
    ///
    /// The UNIQUE(user_id, channel_id) constraint is the authority for
    /// the one-row-per-pair invariant; a constraint violation surfaces
    /// as `Error::Database` which callers map to their workflow conflict.
    #[instrument(skip(self, membership), fields(user_id = %membership.user_id, channel_id = %membership.channel_id, status = %membership.status))]
    pub fn create(&self, membership: &Membership) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memberships (id, user_id, channel_id, role, status, joined_at, last_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                membership.id.to_string(),
                membership.user_id.to_string(),
                membership.channel_id.to_string(),
                membership.role as u8,
                membership.status.as_str(),
                membership.joined_at.to_rfc3339(),
                membership.last_read.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get the membership for a (user, channel) pair
    #[instrument(skip(self))]
    pub fn find(&self, user_id: Uuid, channel_id: Uuid) -> Result<Option<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, channel_id, role, status, joined_at, last_read
             FROM memberships WHERE user_id = ?1 AND channel_id = ?2",
        )?;

        let membership = stmt
            .query_row(
                params![user_id.to_string(), channel_id.to_string()],
                Self::map_membership,
            )
            .optional()?;

        Ok(membership)
    }

    /// Find the channel's admin membership
    #[instrument(skip(self))]
    pub fn find_admin(&self, channel_id: Uuid) -> Result<Option<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, channel_id, role, status, joined_at, last_read
             FROM memberships WHERE channel_id = ?1 AND role = ?2
             ORDER BY joined_at LIMIT 1",
        )?;

        let membership = stmt
            .query_row(
                params![channel_id.to_string(), ChannelRole::Admin as u8],
                Self::map_membership,
            )
            .optional()?;

        Ok(membership)
    }

    fn map_membership(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
        Ok(Membership {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            user_id: parse_uuid(&row.get::<_, String>(1)?)?,
            channel_id: parse_uuid(&row.get::<_, String>(2)?)?,
            role: role_from_u8(row.get::<_, u8>(3)?),
            status: status_from_str(&row.get::<_, String>(4)?),
            joined_at: parse_datetime(&row.get::<_, String>(5)?)?,
            last_read: parse_datetime_opt(row.get::<_, Option<String>>(6)?)?,
        })
    }

    /// Total membership rows for a channel (any status)
    pub fn count_for_channel(&self, channel_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memberships WHERE channel_id = ?1",
            params![channel_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Remove a membership row
    #[instrument(skip(self))]
    pub fn remove(&self, user_id: Uuid, channel_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM memberships WHERE user_id = ?1 AND channel_id = ?2",
            params![user_id.to_string(), channel_id.to_string()],
        )?;
        Ok(())
    }

    /// Membership status per user for one channel, used to annotate
    /// user-search results
    #[instrument(skip(self))]
    pub fn statuses_for_channel(&self, channel_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, status FROM memberships WHERE channel_id = ?1",
        )?;

        let rows = stmt
            .query_map(params![channel_id.to_string()], |row| {
                Ok((parse_uuid(&row.get::<_, String>(0)?)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
