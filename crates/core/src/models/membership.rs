//! Membership, role and approval-status models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user within a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelRole {
    /// Channel creator - receives join requests, manages the channel
    Admin = 2,
    /// Standard participant
    Member = 1,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Admin => "admin",
            ChannelRole::Member => "member",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approval status of a membership.
///
/// `Pending` and `Rejected` memberships block posting and reading;
/// `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Accepted,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Accepted => "accepted",
            MembershipStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's relationship to a channel.
///
/// At most one membership exists per (user, channel) pair; the schema
/// enforces this with a unique constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub role: ChannelRole,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    /// Stored for future read-tracking; currently unused by the router
    pub last_read: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn new(
        user_id: Uuid,
        channel_id: Uuid,
        role: ChannelRole,
        status: MembershipStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel_id,
            role,
            status,
            joined_at: Utc::now(),
            last_read: None,
        }
    }

    /// May this membership read and post in its channel?
    pub fn is_accepted(&self) -> bool {
        self.status == MembershipStatus::Accepted
    }
}
