//! User and session storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Session, User};

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new user
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub fn create(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at, last_login) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.created_at.to_rfc3339(),
                user.last_login.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Find user by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at, last_login FROM users WHERE id = ?1",
        )?;

        let user = stmt
            .query_row(params![id.to_string()], Self::map_user)
            .optional()?;

        Ok(user)
    }

    /// Find user by username (case-insensitive)
    #[instrument(skip(self))]
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at, last_login FROM users WHERE username = ?1",
        )?;

        let user = stmt.query_row(params![username], Self::map_user).optional()?;

        Ok(user)
    }

    /// Case-insensitive substring search over usernames, excluding one user
    #[instrument(skip(self))]
    pub fn search(&self, query: &str, exclude: Uuid) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at, last_login FROM users
             WHERE instr(lower(username), ?1) > 0 AND id != ?2
             ORDER BY username",
        )?;

        let users = stmt
            .query_map(
                params![query.to_lowercase(), exclude.to_string()],
                Self::map_user,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: parse_datetime(&row.get::<_, String>(3)?)?,
            last_login: parse_datetime_opt(row.get::<_, Option<String>>(4)?)?,
        })
    }

    /// Update last login time
    pub fn update_last_login(&self, user_id: Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id.to_string()],
        )?;
        Ok(())
    }

    /// Create a session
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.user_id.to_string(),
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find valid (non-expired) session by token
    #[instrument(skip(self, token))]
    pub fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT token, user_id, created_at, expires_at FROM sessions
             WHERE token = ?1 AND expires_at > ?2",
        )?;

        let now = Utc::now().to_rfc3339();
        let session = stmt
            .query_row(params![token, now], |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?)?,
                    expires_at: parse_datetime(&row.get::<_, String>(3)?)?,
                })
            })
            .optional()?;

        Ok(session)
    }

    /// Push a session's expiry forward (silent renewal)
    pub fn extend_session(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            params![expires_at.to_rfc3339(), token],
        )?;
        Ok(())
    }

    /// Delete a session
    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    /// Clean up expired sessions
    pub fn cleanup_expired_sessions(&self) -> Result<u64> {
        let count = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(count as u64)
    }
}
