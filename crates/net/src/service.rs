//! Chat operations behind every client request
//!
//! Each operation runs its database work inside a short synchronous
//! lock scope, then publishes events. The database lock is never held
//! across an await and never taken inside a registry or router lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use palaver_core::invariants;
use palaver_core::models::{
    Channel, ChannelRole, Conversation, Identity, Membership, MembershipStatus, Message,
    MessageDisplay,
};
use palaver_core::storage::is_unique_violation;
use palaver_core::{Database, Error as CoreError};

use crate::protocol::{ServerEvent, UserHit};
use crate::registry::{ConnectionRegistry, EventSender};
use crate::rooms::RoomRouter;

type CoreResult<T> = std::result::Result<T, CoreError>;

/// Recent-history window delivered on channel selection and
/// conversation start
const HISTORY_LIMIT: u32 = 50;

/// Caller context for one request: who is asking, on which connection,
/// and where their events go
#[derive(Clone)]
pub struct RequestCtx {
    pub conn_id: Uuid,
    pub identity: Identity,
    pub outbound: EventSender,
}

impl RequestCtx {
    /// Queue an event on this connection's own outbound channel
    pub fn deliver(&self, event: ServerEvent) {
        let _ = self.outbound.send(event);
    }
}

/// The service every connection dispatches into
pub struct ChatService {
    db: Arc<Mutex<Database>>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRouter>,
}

impl ChatService {
    pub fn new(
        db: Arc<Mutex<Database>>,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomRouter>,
    ) -> Self {
        Self {
            db,
            registry,
            rooms,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomRouter> {
        &self.rooms
    }

    pub fn database(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        // A poisoned lock means a panicked store call; the data itself
        // is no worse than before that call
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the connection into a channel's room
    pub async fn join_channel(&self, ctx: &RequestCtx, channel_id: Uuid) -> CoreResult<()> {
        {
            let db = self.db();
            let channel = db
                .channels()
                .find_by_id(channel_id)?
                .ok_or(CoreError::ChannelNotFound)?;
            Self::ensure_membership(&db, &ctx.identity, &channel)?;
        }
        self.rooms
            .join(ctx.conn_id, ctx.outbound.clone(), channel_id)
            .await;
        Ok(())
    }

    /// Persist a message, fan it out to the channel room, and return
    /// the persisted message so the caller's acknowledgment carries it
    /// independent of the broadcast echo.
    pub async fn send_message(
        &self,
        ctx: &RequestCtx,
        channel_id: Uuid,
        content: String,
    ) -> CoreResult<MessageDisplay> {
        let persisted = {
            let db = self.db();
            Message::validate_content(&content)?;
            let channel = db
                .channels()
                .find_by_id(channel_id)?
                .ok_or(CoreError::ChannelNotFound)?;
            Self::ensure_membership(&db, &ctx.identity, &channel)?;

            let message = Message::new(channel_id, ctx.identity.id, content);
            invariants::assert_message_invariants(&message);
            db.messages().create(&message)?;
            db.channels().touch_activity(channel_id, message.sent_at)?;

            MessageDisplay {
                id: message.id,
                channel_id,
                sender_id: ctx.identity.id,
                sender_username: ctx.identity.username.clone(),
                content: message.content,
                sent_at: message.sent_at,
            }
        };

        debug!(message_id = %persisted.id, channel_id = %channel_id, "Message persisted");

        let event = ServerEvent::NewMessage {
            message: persisted.clone(),
        };
        self.rooms.publish(channel_id, event).await;
        Ok(persisted)
    }

    /// Hard-delete a message the caller sent, then tell the room
    pub async fn delete_message(&self, ctx: &RequestCtx, message_id: Uuid) -> CoreResult<()> {
        let channel_id = {
            let db = self.db();
            let message = db
                .messages()
                .find_by_id(message_id)?
                .ok_or(CoreError::MessageNotFound)?;
            if message.sender_id != ctx.identity.id {
                return Err(CoreError::NotAuthorized(
                    "only the sender may delete a message".into(),
                ));
            }
            db.messages().delete(message_id)?;
            message.channel_id
        };

        info!(message_id = %message_id, channel_id = %channel_id, "Message deleted");
        self.rooms
            .publish(
                channel_id,
                ServerEvent::MessageDeleted {
                    message_id,
                    channel_id,
                },
            )
            .await;
        Ok(())
    }

    /// Join the channel room and deliver its detail view to the caller
    pub async fn select_channel(&self, ctx: &RequestCtx, channel_id: Uuid) -> CoreResult<()> {
        let (channel, messages, member_count) = {
            let db = self.db();
            let channel = db
                .channels()
                .find_by_id(channel_id)?
                .ok_or(CoreError::ChannelNotFound)?;
            Self::ensure_membership(&db, &ctx.identity, &channel)?;
            let messages = db.messages().list_recent(channel_id, HISTORY_LIMIT)?;
            let member_count = db.memberships().count_for_channel(channel_id)?;
            (channel, messages, member_count)
        };

        self.rooms
            .join(ctx.conn_id, ctx.outbound.clone(), channel_id)
            .await;
        ctx.deliver(ServerEvent::ChannelSelected {
            channel,
            messages,
            member_count,
        });
        Ok(())
    }

    /// Empty term: the caller's channels, most recently active first.
    /// Otherwise: substring search over names, private channels only
    /// where the caller holds a membership row.
    pub async fn search_channels(&self, ctx: &RequestCtx, term: &str) -> CoreResult<()> {
        let channels = {
            let db = self.db();
            let term = term.trim().to_lowercase();
            if term.is_empty() {
                db.channels().list_for_user(ctx.identity.id)?
            } else {
                db.channels().search(&term, ctx.identity.id)?
            }
        };

        ctx.deliver(ServerEvent::SearchChannelsResults { channels });
        Ok(())
    }

    /// Create a channel with its admin membership, then announce it to
    /// every connection
    pub async fn create_channel(
        &self,
        ctx: &RequestCtx,
        name: &str,
        description: Option<String>,
        is_private: bool,
    ) -> CoreResult<()> {
        let channel = {
            let db = self.db();
            let name = name.trim().to_lowercase();
            Channel::validate_name(&name)?;

            let channel = Channel::new(
                name,
                description.unwrap_or_default(),
                ctx.identity.id,
                is_private,
            );
            invariants::assert_channel_invariants(&channel);
            db.channels().create(&channel).map_err(|e| match e {
                CoreError::Database(ref err) if is_unique_violation(err) => CoreError::NameConflict,
                other => other,
            })?;

            let membership = Membership::new(
                ctx.identity.id,
                channel.id,
                ChannelRole::Admin,
                MembershipStatus::Accepted,
            );
            invariants::assert_membership_invariants(&membership);
            if let Err(e) = db.memberships().create(&membership) {
                // A channel without its admin row is unusable; undo
                warn!(channel_id = %channel.id, error = %e, "Admin membership write failed, removing channel");
                db.channels().delete(channel.id)?;
                return Err(e);
            }
            channel
        };

        info!(channel_id = %channel.id, channel_name = %channel.name, "Channel created");
        self.registry
            .broadcast_all(ServerEvent::ChannelCreated { channel })
            .await;
        Ok(())
    }

    /// Ask to join a channel; the admin is notified on their personal
    /// room if they are connected
    pub async fn request_join(&self, ctx: &RequestCtx, channel_id: Uuid) -> CoreResult<()> {
        let (channel_name, admin_id) = {
            let db = self.db();
            let channel = db
                .channels()
                .find_by_id(channel_id)?
                .ok_or(CoreError::ChannelNotFound)?;

            let membership = Membership::new(
                ctx.identity.id,
                channel_id,
                ChannelRole::Member,
                MembershipStatus::Pending,
            );
            db.memberships().create(&membership).map_err(|e| match e {
                CoreError::Database(ref err) if is_unique_violation(err) => {
                    CoreError::AlreadyRequested
                }
                other => other,
            })?;

            let admin_id = db
                .memberships()
                .find_admin(channel_id)?
                .map(|m| m.user_id);
            (channel.name, admin_id)
        };

        debug!(channel_id = %channel_id, user_id = %ctx.identity.id, "Join requested");

        // Best-effort notification, nothing is queued for offline admins
        if let Some(admin_id) = admin_id {
            self.registry
                .send_to_user(
                    admin_id,
                    ServerEvent::JoinRequestNotification {
                        channel_id,
                        channel_name,
                        requester: ctx.identity.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Send channel invites to each user's personal room. Creates no
    /// membership rows; the invite only becomes one when accepted.
    pub async fn invite_users(
        &self,
        ctx: &RequestCtx,
        channel_id: Uuid,
        user_ids: &[Uuid],
    ) -> CoreResult<()> {
        let channel = {
            let db = self.db();
            let channel = db
                .channels()
                .find_by_id(channel_id)?
                .ok_or(CoreError::ChannelNotFound)?;

            let caller = db.memberships().find(ctx.identity.id, channel_id)?;
            if !caller.as_ref().is_some_and(Membership::is_accepted) {
                return Err(CoreError::NotAuthorized(
                    "only channel members may invite".into(),
                ));
            }
            channel
        };

        for &user_id in user_ids {
            self.registry
                .send_to_user(
                    user_id,
                    ServerEvent::ChannelInvite {
                        channel: channel.clone(),
                        invited_by: ctx.identity.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Accept an invitation, creating an accepted membership. Any
    /// existing row, including a rejected one, is a conflict; rejection
    /// is terminal.
    pub async fn accept_invite(&self, ctx: &RequestCtx, channel_id: Uuid) -> CoreResult<()> {
        let db = self.db();
        db.channels()
            .find_by_id(channel_id)?
            .ok_or(CoreError::ChannelNotFound)?;

        let membership = Membership::new(
            ctx.identity.id,
            channel_id,
            ChannelRole::Member,
            MembershipStatus::Accepted,
        );
        db.memberships().create(&membership).map_err(|e| match e {
            CoreError::Database(ref err) if is_unique_violation(err) => CoreError::AlreadyMember,
            other => other,
        })?;

        info!(channel_id = %channel_id, user_id = %ctx.identity.id, "Invite accepted");
        Ok(())
    }

    /// Username substring search, annotated with each user's membership
    /// status in the given channel
    pub async fn search_users(
        &self,
        ctx: &RequestCtx,
        query: &str,
        channel_id: Uuid,
    ) -> CoreResult<()> {
        let users = {
            let db = self.db();
            let found = db.users().search(query, ctx.identity.id)?;
            let statuses: HashMap<Uuid, String> = db
                .memberships()
                .statuses_for_channel(channel_id)?
                .into_iter()
                .collect();

            found
                .into_iter()
                .map(|u| UserHit {
                    membership_status: statuses.get(&u.id).cloned(),
                    id: u.id,
                    username: u.username,
                })
                .collect()
        };

        ctx.deliver(ServerEvent::SearchUserResults { users });
        Ok(())
    }

    /// Find or create the direct conversation with another user and
    /// deliver it with its recent history
    pub async fn start_conversation(&self, ctx: &RequestCtx, receiver_id: Uuid) -> CoreResult<()> {
        let (conversation, messages) = {
            let db = self.db();
            db.users()
                .find_by_id(receiver_id)?
                .ok_or(CoreError::UserNotFound)?;

            let conversation = match db
                .conversations()
                .find_by_pair(ctx.identity.id, receiver_id)?
            {
                Some(existing) => existing,
                None => {
                    let fresh = Conversation::between(ctx.identity.id, receiver_id);
                    match db.conversations().create(&fresh) {
                        Ok(()) => fresh,
                        // Racing creation for the same pair: use theirs
                        Err(CoreError::Database(ref e)) if is_unique_violation(e) => db
                            .conversations()
                            .find_by_pair(ctx.identity.id, receiver_id)?
                            .ok_or(CoreError::UserNotFound)?,
                        Err(other) => return Err(other),
                    }
                }
            };

            let messages = db
                .conversations()
                .list_recent_messages(conversation.id, HISTORY_LIMIT)?;
            (conversation, messages)
        };

        ctx.deliver(ServerEvent::ConversationStarted {
            conversation,
            messages,
        });
        Ok(())
    }

    /// The membership gate in front of reading and posting.
    ///
    /// No row on a public channel creates an accepted member row on the
    /// spot; no row on a private channel, or a pending/rejected row,
    /// refuses with nothing persisted.
    fn ensure_membership(db: &Database, identity: &Identity, channel: &Channel) -> CoreResult<()> {
        match db.memberships().find(identity.id, channel.id)? {
            Some(m) if m.is_accepted() => {
                invariants::assert_can_post(&m);
                Ok(())
            }
            Some(m) => Err(CoreError::NotAuthorized(format!(
                "membership is {}",
                m.status
            ))),
            None if !channel.is_private => {
                let membership = Membership::new(
                    identity.id,
                    channel.id,
                    ChannelRole::Member,
                    MembershipStatus::Accepted,
                );
                match db.memberships().create(&membership) {
                    Ok(()) => Ok(()),
                    // Racing implicit join: whatever row won decides
                    Err(CoreError::Database(ref e)) if is_unique_violation(e) => {
                        match db.memberships().find(identity.id, channel.id)? {
                            Some(m) if m.is_accepted() => Ok(()),
                            _ => Err(CoreError::NotAuthorized("membership not accepted".into())),
                        }
                    }
                    Err(other) => Err(other),
                }
            }
            None => Err(CoreError::NotAuthorized(
                "channel is private".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::AuthService;
    use tokio::sync::mpsc;

    struct Fixture {
        service: ChatService,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            Self {
                service: ChatService::new(
                    Arc::new(Mutex::new(db)),
                    Arc::new(ConnectionRegistry::new()),
                    Arc::new(RoomRouter::new()),
                ),
            }
        }

        fn user(&self, name: &str) -> Identity {
            let db = self.service.db();
            let session = AuthService::register(&db, name, "hunter22").unwrap();
            let user = db.users().find_by_id(session.user_id).unwrap().unwrap();
            Identity::from(&user)
        }

        fn ctx(&self, identity: Identity) -> (RequestCtx, mpsc::UnboundedReceiver<ServerEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                RequestCtx {
                    conn_id: Uuid::new_v4(),
                    identity,
                    outbound: tx,
                },
                rx,
            )
        }

        fn channel(&self, ctx: &RequestCtx, name: &str, is_private: bool) -> Channel {
            let db = self.service.db();
            let channel = Channel::new(name.to_string(), String::new(), ctx.identity.id, is_private);
            db.channels().create(&channel).unwrap();
            db.memberships()
                .create(&Membership::new(
                    ctx.identity.id,
                    channel.id,
                    ChannelRole::Admin,
                    MembershipStatus::Accepted,
                ))
                .unwrap();
            channel
        }
    }

    #[tokio::test]
    async fn test_send_creates_implicit_membership_on_public_channel() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "general", false);

        let (visitor, mut vrx) = fx.ctx(fx.user("bob"));
        let display = fx
            .service
            .send_message(&visitor, channel.id, "first!".to_string())
            .await
            .unwrap();

        // The persisted message comes back to the caller; the room
        // broadcast never reaches a connection outside the room
        assert_eq!(display.content, "first!");
        assert_eq!(display.sender_username, "bob");
        assert!(vrx.try_recv().is_err());

        let db = fx.service.db();
        let membership = db
            .memberships()
            .find(visitor.identity.id, channel.id)
            .unwrap()
            .unwrap();
        assert!(membership.is_accepted());
    }

    #[tokio::test]
    async fn test_private_channel_refuses_non_member_and_persists_nothing() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "secrets", true);

        let (visitor, _vrx) = fx.ctx(fx.user("bob"));
        let err = fx
            .service
            .send_message(&visitor, channel.id, "psst".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));

        let db = fx.service.db();
        assert_eq!(db.messages().count_for_channel(channel.id).unwrap(), 0);
        assert!(db
            .memberships()
            .find(visitor.identity.id, channel.id)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_pending_member_cannot_post() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "general", false);

        let (visitor, _vrx) = fx.ctx(fx.user("carol"));
        {
            let db = fx.service.db();
            db.memberships()
                .create(&Membership::new(
                    visitor.identity.id,
                    channel.id,
                    ChannelRole::Member,
                    MembershipStatus::Pending,
                ))
                .unwrap();
        }

        let err = fx
            .service
            .send_message(&visitor, channel.id, "hi".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));

        let db = fx.service.db();
        assert_eq!(db.messages().count_for_channel(channel.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_sender_may_delete() {
        let fx = Fixture::new();
        let (alice, _arx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&alice, "general", false);
        let message_id = fx
            .service
            .send_message(&alice, channel.id, "mine".to_string())
            .await
            .unwrap()
            .id;

        let (dave, _drx) = fx.ctx(fx.user("dave"));
        let err = fx
            .service
            .delete_message(&dave, message_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));

        fx.service.delete_message(&alice, message_id).await.unwrap();
        let db = fx.service.db();
        assert!(db.messages().find_by_id(message_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_join_request_conflicts() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "dev-team", true);

        let (carol, _crx) = fx.ctx(fx.user("carol"));
        fx.service.request_join(&carol, channel.id).await.unwrap();

        let err = fx
            .service
            .request_join(&carol, channel.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRequested));
    }

    #[tokio::test]
    async fn test_rejected_membership_is_terminal() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "dev-team", true);

        let (bob, _brx) = fx.ctx(fx.user("bob"));
        {
            let db = fx.service.db();
            db.memberships()
                .create(&Membership::new(
                    bob.identity.id,
                    channel.id,
                    ChannelRole::Member,
                    MembershipStatus::Rejected,
                ))
                .unwrap();
        }

        let err = fx.service.accept_invite(&bob, channel.id).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyMember));

        let err = fx.service.request_join(&bob, channel.id).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRequested));
    }

    #[tokio::test]
    async fn test_create_channel_writes_admin_membership() {
        let fx = Fixture::new();
        let (alice, _arx) = fx.ctx(fx.user("alice"));

        fx.service
            .create_channel(&alice, "Dev-Team", None, false)
            .await
            .unwrap();

        let db = fx.service.db();
        let channel = db.channels().find_by_name("dev-team").unwrap().unwrap();
        let membership = db
            .memberships()
            .find(alice.identity.id, channel.id)
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, ChannelRole::Admin);
        assert!(membership.is_accepted());
    }

    #[tokio::test]
    async fn test_duplicate_channel_name_conflicts() {
        let fx = Fixture::new();
        let (alice, _arx) = fx.ctx(fx.user("alice"));

        fx.service
            .create_channel(&alice, "general", None, false)
            .await
            .unwrap();
        let err = fx
            .service
            .create_channel(&alice, "general", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NameConflict));
    }

    #[tokio::test]
    async fn test_invite_requires_accepted_membership() {
        let fx = Fixture::new();
        let (owner, _orx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&owner, "general", false);

        let (outsider, _rx) = fx.ctx(fx.user("bob"));
        let target = fx.user("carol");
        let err = fx
            .service
            .invite_users(&outsider, channel.id, &[target.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_search_users_annotates_membership() {
        let fx = Fixture::new();
        let (alice, _arx) = fx.ctx(fx.user("alice"));
        let channel = fx.channel(&alice, "general", false);

        let bob = fx.user("bob");
        let carol = fx.user("carolyn");
        {
            let db = fx.service.db();
            db.memberships()
                .create(&Membership::new(
                    bob.id,
                    channel.id,
                    ChannelRole::Member,
                    MembershipStatus::Pending,
                ))
                .unwrap();
        }
        let _ = carol;

        let (ctx, mut rx) = fx.ctx(alice.identity.clone());
        fx.service.search_users(&ctx, "o", channel.id).await.unwrap();

        match rx.try_recv().unwrap() {
            ServerEvent::SearchUserResults { users } => {
                // "o" matches bob and carolyn, never the caller
                assert_eq!(users.len(), 2);
                let bob_hit = users.iter().find(|u| u.username == "bob").unwrap();
                assert_eq!(bob_hit.membership_status.as_deref(), Some("pending"));
                let carol_hit = users.iter().find(|u| u.username == "carolyn").unwrap();
                assert!(carol_hit.membership_status.is_none());
            }
            other => panic!("Expected search results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_conversation_is_idempotent_per_pair() {
        let fx = Fixture::new();
        let (alice, mut arx) = fx.ctx(fx.user("alice"));
        let bob = fx.user("bob");

        fx.service.start_conversation(&alice, bob.id).await.unwrap();
        let first = match arx.try_recv().unwrap() {
            ServerEvent::ConversationStarted { conversation, .. } => conversation.id,
            other => panic!("Expected conversation, got {:?}", other),
        };

        let (bob_ctx, mut brx) = fx.ctx(bob.clone());
        fx.service
            .start_conversation(&bob_ctx, alice.identity.id)
            .await
            .unwrap();
        match brx.try_recv().unwrap() {
            ServerEvent::ConversationStarted { conversation, .. } => {
                assert_eq!(conversation.id, first);
            }
            other => panic!("Expected conversation, got {:?}", other),
        }
    }
}
