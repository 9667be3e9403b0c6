//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{ChannelRole, MembershipStatus};

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| {
        SqlError::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            SqlError::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Convert a stored u8 to ChannelRole
pub fn role_from_u8(value: u8) -> ChannelRole {
    match value {
        2 => ChannelRole::Admin,
        _ => ChannelRole::Member,
    }
}

/// Parse a stored status string
pub fn status_from_str(value: &str) -> MembershipStatus {
    match value {
        "accepted" => MembershipStatus::Accepted,
        "rejected" => MembershipStatus::Rejected,
        _ => MembershipStatus::Pending,
    }
}

/// Does this error represent a UNIQUE constraint violation?
///
/// Used to turn racing inserts on (user, channel) or channel name into
/// the workflow conflicts the caller reports. Matches the extended
/// UNIQUE code only; foreign-key and NOT NULL failures stay internal
/// errors.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
