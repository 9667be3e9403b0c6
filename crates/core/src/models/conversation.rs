//! Direct-conversation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A direct conversation between exactly two users.
///
/// The participant pair is stored ordered (`user_a < user_b`) so the
/// schema can enforce one conversation per pair regardless of who
/// started it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation for a pair of users, normalizing the order.
    pub fn between(first: Uuid, second: Uuid) -> Self {
        let (user_a, user_b) = Self::ordered_pair(first, second);
        Self {
            id: Uuid::new_v4(),
            user_a,
            user_b,
            created_at: Utc::now(),
        }
    }

    pub fn ordered_pair(first: Uuid, second: Uuid) -> (Uuid, Uuid) {
        if first <= second {
            (first, second)
        } else {
            (second, first)
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }
}

/// A direct message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub read: bool,
    pub sent_at: DateTime<Utc>,
}

impl DirectMessage {
    pub fn new(conversation_id: Uuid, sender_id: Uuid, receiver_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            receiver_id,
            content,
            read: false,
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_order_normalized() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c1 = Conversation::between(a, b);
        let c2 = Conversation::between(b, a);
        assert_eq!((c1.user_a, c1.user_b), (c2.user_a, c2.user_b));
        assert!(c1.user_a <= c1.user_b);
        assert!(c1.involves(a) && c1.involves(b));
    }
}
