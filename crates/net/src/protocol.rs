//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Event names use the spaced form clients see (`"new message"`,
//! `"select channel"`), carried in the `type` field.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_core::models::{
    Channel, ChannelSummary, Conversation, DirectMessage, Identity, MessageDisplay,
};

/// A user-search hit, annotated with the user's membership status in
/// the channel the search was scoped to (drives the invite picker)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHit {
    pub id: Uuid,
    pub username: String,
    /// "pending", "accepted", "rejected", or absent when no row exists
    pub membership_status: Option<String>,
}

/// Client-to-server requests
///
/// Every operational request carries an optional `request_id`; when
/// present the server answers with an `ack` echoing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// First frame on every connection; anything else is rejected
    #[serde(rename = "authenticate")]
    Authenticate { token: String },

    #[serde(rename = "join channel")]
    JoinChannel {
        channel_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "new message")]
    NewMessage {
        channel_id: Uuid,
        content: String,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "delete message")]
    DeleteMessage {
        message_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "select channel")]
    SelectChannel {
        channel_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "search channels")]
    SearchChannels {
        term: String,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "create channel")]
    CreateChannel {
        name: String,
        description: Option<String>,
        is_private: bool,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "request join channel")]
    RequestJoin {
        channel_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "invite users")]
    InviteUsers {
        channel_id: Uuid,
        user_ids: Vec<Uuid>,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "accept channel invite")]
    AcceptInvite {
        channel_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "search users")]
    SearchUsers {
        query: String,
        channel_id: Uuid,
        request_id: Option<Uuid>,
    },

    #[serde(rename = "start conversation")]
    StartConversation {
        receiver_id: Uuid,
        request_id: Option<Uuid>,
    },
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Handshake succeeded; the connection is registered
    #[serde(rename = "authenticated")]
    Authenticated { identity: Identity },

    /// Handshake failed; the socket closes after this frame
    #[serde(rename = "auth rejected")]
    AuthRejected { reason: String },

    /// Outcome of a request that carried a request_id
    #[serde(rename = "ack")]
    Ack {
        request_id: Uuid,
        ok: bool,
        /// Stable error code when ok is false
        error: Option<String>,
        /// Human-readable detail
        detail: Option<String>,
        /// The persisted message when acknowledging a send, so the
        /// sender gets it even without the room broadcast
        message: Option<MessageDisplay>,
    },

    /// A message was posted in a room this connection has joined
    #[serde(rename = "new message")]
    NewMessage { message: MessageDisplay },

    /// A message was removed; clients drop it from display
    #[serde(rename = "message deleted")]
    MessageDeleted {
        message_id: Uuid,
        channel_id: Uuid,
    },

    /// Broadcast to every connection when any channel is created
    #[serde(rename = "channel created")]
    ChannelCreated { channel: Channel },

    /// Channel detail delivered to the selecting connection only
    #[serde(rename = "channel selected")]
    ChannelSelected {
        channel: Channel,
        messages: Vec<MessageDisplay>,
        member_count: u64,
    },

    /// Delivered on an invitee's personal room
    #[serde(rename = "channel invite")]
    ChannelInvite {
        channel: Channel,
        invited_by: Identity,
    },

    /// Delivered on the channel admin's personal room
    #[serde(rename = "join request notification")]
    JoinRequestNotification {
        channel_id: Uuid,
        channel_name: String,
        requester: Identity,
    },

    #[serde(rename = "search channels results")]
    SearchChannelsResults { channels: Vec<ChannelSummary> },

    #[serde(rename = "search user results")]
    SearchUserResults { users: Vec<UserHit> },

    #[serde(rename = "conversation started")]
    ConversationStarted {
        conversation: Conversation,
        messages: Vec<DirectMessage>,
    },

    /// This connection was replaced by a newer login for the same
    /// identity; the server closes the socket after sending it
    #[serde(rename = "evicted")]
    Evicted { reason: String },
}

impl ServerEvent {
    /// Ok acknowledgment for a correlated request; `message` is the
    /// persisted message when the request was a send
    pub fn ack_ok(request_id: Uuid, message: Option<MessageDisplay>) -> Self {
        ServerEvent::Ack {
            request_id,
            ok: true,
            error: None,
            detail: None,
            message,
        }
    }

    /// Error acknowledgment carrying the stable code and detail text
    pub fn ack_err(request_id: Uuid, err: &palaver_core::Error) -> Self {
        ServerEvent::Ack {
            request_id,
            ok: false,
            error: Some(err.code().to_string()),
            detail: Some(err.to_string()),
            message: None,
        }
    }
}
