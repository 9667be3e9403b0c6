//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, mock, future network backend).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Channel, ChannelSummary, Conversation, DirectMessage, Membership, Message, MessageDisplay,
    Session, User,
};

/// User repository operations
pub trait UserRepository {
    /// Create a new user
    fn create_user(&self, user: &User) -> Result<()>;

    /// Find user by ID
    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find user by username (case-insensitive)
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Case-insensitive substring search over usernames, excluding one user
    fn search_users(&self, query: &str, exclude: Uuid) -> Result<Vec<User>>;

    /// Update user's last login time
    fn update_last_login(&self, user_id: Uuid) -> Result<()>;

    /// Create a session
    fn create_session(&self, session: &Session) -> Result<()>;

    /// Find a valid (non-expired) session
    fn find_valid_session(&self, token: &str) -> Result<Option<Session>>;

    /// Push a session's expiry forward
    fn extend_session(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Delete a session
    fn delete_session(&self, token: &str) -> Result<()>;

    /// Clean up expired sessions
    fn cleanup_expired_sessions(&self) -> Result<u64>;
}

/// Channel repository operations
pub trait ChannelRepository {
    /// Create a new channel
    fn create_channel(&self, channel: &Channel) -> Result<()>;

    /// Find channel by ID
    fn find_channel_by_id(&self, id: Uuid) -> Result<Option<Channel>>;

    /// Find channel by name
    fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>>;

    /// Delete a channel
    fn delete_channel(&self, channel_id: Uuid) -> Result<()>;

    /// Bump a channel's last_activity
    fn touch_channel_activity(&self, channel_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// List channels the user holds a membership in
    fn list_channels_for_user(&self, user_id: Uuid) -> Result<Vec<ChannelSummary>>;

    /// Search channels by name, hiding private channels from non-members
    fn search_channels(&self, term: &str, caller_id: Uuid) -> Result<Vec<ChannelSummary>>;
}

/// Membership repository operations
pub trait MembershipRepository {
    /// Insert a membership row
    fn create_membership(&self, membership: &Membership) -> Result<()>;

    /// Get the membership for a (user, channel) pair
    fn find_membership(&self, user_id: Uuid, channel_id: Uuid) -> Result<Option<Membership>>;

    /// Find the channel's admin membership
    fn find_channel_admin(&self, channel_id: Uuid) -> Result<Option<Membership>>;

    /// Total membership rows for a channel
    fn count_channel_members(&self, channel_id: Uuid) -> Result<u64>;

    /// Remove a membership row
    fn remove_membership(&self, user_id: Uuid, channel_id: Uuid) -> Result<()>;

    /// Membership status per user for one channel
    fn membership_statuses(&self, channel_id: Uuid) -> Result<Vec<(Uuid, String)>>;
}

/// Message repository operations
pub trait MessageRepository {
    /// Create a new message
    fn create_message(&self, message: &Message) -> Result<()>;

    /// Find message by ID
    fn find_message_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// Most recent messages for a channel with sender info, oldest first
    fn list_recent_messages(&self, channel_id: Uuid, limit: u32) -> Result<Vec<MessageDisplay>>;

    /// Hard delete a message
    fn delete_message(&self, message_id: Uuid) -> Result<()>;

    /// Get message count for a channel
    fn count_messages_for_channel(&self, channel_id: Uuid) -> Result<u64>;
}

/// Direct-conversation repository operations
pub trait ConversationRepository {
    /// Create a conversation
    fn create_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Find the conversation for a user pair
    fn find_conversation_by_pair(&self, first: Uuid, second: Uuid) -> Result<Option<Conversation>>;

    /// Append a direct message
    fn create_direct_message(&self, message: &DirectMessage) -> Result<()>;

    /// Most recent direct messages, oldest first
    fn list_recent_direct_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<DirectMessage>>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage:
    UserRepository + ChannelRepository + MembershipRepository + MessageRepository + ConversationRepository
{
}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: UserRepository
        + ChannelRepository
        + MembershipRepository
        + MessageRepository
        + ConversationRepository
{
}
