//! SQLite storage layer for Palaver

mod channels;
mod conversations;
mod memberships;
mod messages;
mod migrations;
mod parse;
mod traits;
mod users;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Channel, ChannelSummary, Conversation, DirectMessage, Membership, Message, MessageDisplay,
    Session, User,
};
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

pub use channels::ChannelStore;
pub use conversations::ConversationStore;
pub use memberships::MembershipStore;
pub use messages::MessageStore;
pub use parse::is_unique_violation;
pub use traits::{
    ChannelRepository, ConversationRepository, MembershipRepository, MessageRepository, Storage,
    UserRepository,
};
pub use users::UserStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    /// Get user store
    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    /// Get channel store
    pub fn channels(&self) -> ChannelStore<'_> {
        ChannelStore::new(&self.conn)
    }

    /// Get membership store
    pub fn memberships(&self) -> MembershipStore<'_> {
        MembershipStore::new(&self.conn)
    }

    /// Get message store
    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(&self.conn)
    }

    /// Get conversation store
    pub fn conversations(&self) -> ConversationStore<'_> {
        ConversationStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl UserRepository for Database {
    fn create_user(&self, user: &User) -> Result<()> {
        self.users().create(user)
    }

    fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.users().find_by_id(id)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.users().find_by_username(username)
    }

    fn search_users(&self, query: &str, exclude: Uuid) -> Result<Vec<User>> {
        self.users().search(query, exclude)
    }

    fn update_last_login(&self, user_id: Uuid) -> Result<()> {
        self.users().update_last_login(user_id)
    }

    fn create_session(&self, session: &Session) -> Result<()> {
        self.users().create_session(session)
    }

    fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        self.users().find_valid_session(token)
    }

    fn extend_session(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.users().extend_session(token, expires_at)
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        self.users().delete_session(token)
    }

    fn cleanup_expired_sessions(&self) -> Result<u64> {
        self.users().cleanup_expired_sessions()
    }
}

impl ChannelRepository for Database {
    fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.channels().create(channel)
    }

    fn find_channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        self.channels().find_by_id(id)
    }

    fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        self.channels().find_by_name(name)
    }

    fn delete_channel(&self, channel_id: Uuid) -> Result<()> {
        self.channels().delete(channel_id)
    }

    fn touch_channel_activity(&self, channel_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.channels().touch_activity(channel_id, at)
    }

    fn list_channels_for_user(&self, user_id: Uuid) -> Result<Vec<ChannelSummary>> {
        self.channels().list_for_user(user_id)
    }

    fn search_channels(&self, term: &str, caller_id: Uuid) -> Result<Vec<ChannelSummary>> {
        self.channels().search(term, caller_id)
    }
}

impl MembershipRepository for Database {
    fn create_membership(&self, membership: &Membership) -> Result<()> {
        self.memberships().create(membership)
    }

    fn find_membership(&self, user_id: Uuid, channel_id: Uuid) -> Result<Option<Membership>> {
        self.memberships().find(user_id, channel_id)
    }

    fn find_channel_admin(&self, channel_id: Uuid) -> Result<Option<Membership>> {
        self.memberships().find_admin(channel_id)
    }

    fn count_channel_members(&self, channel_id: Uuid) -> Result<u64> {
        self.memberships().count_for_channel(channel_id)
    }

    fn remove_membership(&self, user_id: Uuid, channel_id: Uuid) -> Result<()> {
        self.memberships().remove(user_id, channel_id)
    }

    fn membership_statuses(&self, channel_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        self.memberships().statuses_for_channel(channel_id)
    }
}

impl MessageRepository for Database {
    fn create_message(&self, message: &Message) -> Result<()> {
        self.messages().create(message)
    }

    fn find_message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        self.messages().find_by_id(id)
    }

    fn list_recent_messages(&self, channel_id: Uuid, limit: u32) -> Result<Vec<MessageDisplay>> {
        self.messages().list_recent(channel_id, limit)
    }

    fn delete_message(&self, message_id: Uuid) -> Result<()> {
        self.messages().delete(message_id)
    }

    fn count_messages_for_channel(&self, channel_id: Uuid) -> Result<u64> {
        self.messages().count_for_channel(channel_id)
    }
}

impl ConversationRepository for Database {
    fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations().create(conversation)
    }

    fn find_conversation_by_pair(&self, first: Uuid, second: Uuid) -> Result<Option<Conversation>> {
        self.conversations().find_by_pair(first, second)
    }

    fn create_direct_message(&self, message: &DirectMessage) -> Result<()> {
        self.conversations().create_message(message)
    }

    fn list_recent_direct_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<DirectMessage>> {
        self.conversations()
            .list_recent_messages(conversation_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelRole, MembershipStatus};
    use chrono::Duration;

    fn test_user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    fn test_channel(name: &str, creator: Uuid, private: bool) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: "a test channel".to_string(),
            creator_id: creator,
            is_private: private,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        }
    }

    #[test]
    fn open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version() >= 3);
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("alice");
        db.create_user(&user).unwrap();

        let found = db.find_user_by_username("ALICE").unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[test]
    fn duplicate_username_differing_in_case_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("alice")).unwrap();

        let err = db.create_user(&test_user("Alice")).unwrap_err();
        match err {
            crate::Error::Database(e) => assert!(is_unique_violation(&e)),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn membership_pair_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("bob");
        db.create_user(&user).unwrap();
        let channel = test_channel("general", user.id, false);
        db.create_channel(&channel).unwrap();

        let first = Membership::new(user.id, channel.id, ChannelRole::Member, MembershipStatus::Pending);
        db.create_membership(&first).unwrap();

        let second =
            Membership::new(user.id, channel.id, ChannelRole::Member, MembershipStatus::Accepted);
        let err = db.create_membership(&second).unwrap_err();
        match err {
            crate::Error::Database(e) => assert!(is_unique_violation(&e)),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_key_violation_is_not_a_unique_conflict() {
        let db = Database::open_in_memory().unwrap();

        // Neither the user nor the channel exists
        let membership = Membership::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ChannelRole::Member,
            MembershipStatus::Pending,
        );
        let err = db.create_membership(&membership).unwrap_err();
        match err {
            crate::Error::Database(e) => assert!(!is_unique_violation(&e)),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn deleted_message_is_gone() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("carol");
        db.create_user(&user).unwrap();
        let channel = test_channel("general", user.id, false);
        db.create_channel(&channel).unwrap();

        let message = Message::new(channel.id, user.id, "hello".to_string());
        db.create_message(&message).unwrap();
        assert!(db.find_message_by_id(message.id).unwrap().is_some());

        db.delete_message(message.id).unwrap();
        assert!(db.find_message_by_id(message.id).unwrap().is_none());
        assert_eq!(db.count_messages_for_channel(channel.id).unwrap(), 0);
    }

    #[test]
    fn recent_messages_are_oldest_first_and_capped() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("dave");
        db.create_user(&user).unwrap();
        let channel = test_channel("general", user.id, false);
        db.create_channel(&channel).unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let mut message = Message::new(channel.id, user.id, format!("msg {i}"));
            message.sent_at = base + Duration::seconds(i);
            db.create_message(&message).unwrap();
        }

        let listed = db.list_recent_messages(channel.id, 3).unwrap();
        let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3", "msg 4"]);
        assert_eq!(listed[0].sender_username, "dave");
    }

    #[test]
    fn private_channels_hidden_from_non_member_search() {
        let db = Database::open_in_memory().unwrap();
        let owner = test_user("erin");
        let outsider = test_user("frank");
        db.create_user(&owner).unwrap();
        db.create_user(&outsider).unwrap();

        let public = test_channel("rust-help", owner.id, false);
        let private = test_channel("rust-core", owner.id, true);
        db.create_channel(&public).unwrap();
        db.create_channel(&private).unwrap();
        db.create_membership(&Membership::new(
            owner.id,
            private.id,
            ChannelRole::Admin,
            MembershipStatus::Accepted,
        ))
        .unwrap();

        let for_outsider = db.search_channels("rust", outsider.id).unwrap();
        let names: Vec<_> = for_outsider.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["rust-help"]);

        let for_owner = db.search_channels("rust", owner.id).unwrap();
        assert_eq!(for_owner.len(), 2);
    }

    #[test]
    fn channel_summary_reports_latest_message() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("grace");
        db.create_user(&user).unwrap();
        let channel = test_channel("general", user.id, false);
        db.create_channel(&channel).unwrap();
        db.create_membership(&Membership::new(
            user.id,
            channel.id,
            ChannelRole::Admin,
            MembershipStatus::Accepted,
        ))
        .unwrap();

        let mut first = Message::new(channel.id, user.id, "older".to_string());
        first.sent_at = Utc::now() - Duration::minutes(5);
        db.create_message(&first).unwrap();
        db.create_message(&Message::new(channel.id, user.id, "newer".to_string()))
            .unwrap();

        let listed = db.list_channels_for_user(user.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].latest_message.as_deref(), Some("newer"));
        assert_eq!(listed[0].recent_message_count, 2);
    }

    #[test]
    fn conversation_pair_lookup_ignores_order() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user("henry");
        let b = test_user("iris");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();

        let conversation = Conversation::between(a.id, b.id);
        db.create_conversation(&conversation).unwrap();

        let found = db.find_conversation_by_pair(b.id, a.id).unwrap();
        assert_eq!(found.map(|c| c.id), Some(conversation.id));
    }

    #[test]
    fn direct_messages_are_listed_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user("noel");
        let b = test_user("olive");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();

        let conversation = Conversation::between(a.id, b.id);
        db.create_conversation(&conversation).unwrap();

        let base = Utc::now();
        for i in 0..3 {
            let mut message =
                DirectMessage::new(conversation.id, a.id, b.id, format!("dm {i}"));
            message.sent_at = base + Duration::seconds(i);
            db.create_direct_message(&message).unwrap();
        }

        let listed = db.list_recent_direct_messages(conversation.id, 2).unwrap();
        let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["dm 1", "dm 2"]);
        assert!(!listed[0].read);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palaver.db");

        let user = test_user("kate");
        {
            let db = Database::open(&path).unwrap();
            db.create_user(&user).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let found = db.find_user_by_username("kate").unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[test]
    fn expired_sessions_are_not_valid() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("judy");
        db.create_user(&user).unwrap();

        let expired = Session {
            token: "expired-token".to_string(),
            user_id: user.id,
            created_at: Utc::now() - Duration::hours(2),
            expires_at: Utc::now() - Duration::hours(1),
        };
        db.create_session(&expired).unwrap();
        assert!(db.find_valid_session("expired-token").unwrap().is_none());

        assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
    }
}
