//! Channel room router
//!
//! A room is the set of connections currently viewing a channel. Each
//! connection occupies at most one channel room at a time; joining a
//! room leaves every other room in the same step.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::ServerEvent;
use crate::registry::EventSender;

/// Routes channel-scoped events to the connections in each room
#[derive(Default)]
pub struct RoomRouter {
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, EventSender>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a connection into a channel room, leaving any other room
    /// first. Both steps happen under one write lock.
    pub async fn join(&self, conn_id: Uuid, sender: EventSender, channel_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        for members in rooms.values_mut() {
            members.remove(&conn_id);
        }
        rooms.retain(|_, members| !members.is_empty());
        rooms.entry(channel_id).or_default().insert(conn_id, sender);
        debug!(conn_id = %conn_id, channel_id = %channel_id, "Joined channel room");
    }

    /// Remove a connection from whatever room it occupies
    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        for members in rooms.values_mut() {
            members.remove(&conn_id);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    /// Queue an event to every connection in a room. Returns how many
    /// connections it was queued for.
    ///
    /// Takes the write lock so concurrent publishes to one room are
    /// serialized; the unbounded senders make the whole publish
    /// synchronous under the lock, which fixes per-room FIFO order.
    pub async fn publish(&self, channel_id: Uuid, event: ServerEvent) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(&channel_id) else {
            return 0;
        };
        members.retain(|_, sender| sender.send(event.clone()).is_ok());
        members.len()
    }

    /// Is this connection currently in the given room?
    pub async fn in_room(&self, channel_id: Uuid, conn_id: Uuid) -> bool {
        self.rooms
            .read()
            .await
            .get(&channel_id)
            .is_some_and(|members| members.contains_key(&conn_id))
    }

    pub async fn occupancy(&self, channel_id: Uuid) -> usize {
        self.rooms
            .read()
            .await
            .get(&channel_id)
            .map_or(0, |members| members.len())
    }
}
