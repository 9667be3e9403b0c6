//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use uuid::Uuid;

use crate::models::{Channel, ChannelRole, Membership, MembershipStatus, Message};

/// Validate that a channel's state is internally consistent
pub fn assert_channel_invariants(channel: &Channel) {
    debug_assert!(
        !channel.name.trim().is_empty(),
        "Channel {} has empty name",
        channel.id
    );

    debug_assert!(
        channel.name == channel.name.to_lowercase(),
        "Channel {} name {:?} is not lowercase",
        channel.id,
        channel.name
    );

    debug_assert!(
        channel.creator_id != Uuid::nil(),
        "Channel {} has nil creator_id",
        channel.id
    );
}

/// Validate that a membership is valid
pub fn assert_membership_invariants(membership: &Membership) {
    debug_assert!(
        membership.user_id != Uuid::nil(),
        "Membership {} has nil user_id",
        membership.id
    );

    debug_assert!(
        membership.channel_id != Uuid::nil(),
        "Membership {} has nil channel_id",
        membership.id
    );

    // Admin memberships are written accepted; there is no approval
    // step for a channel's creator
    debug_assert!(
        membership.role != ChannelRole::Admin
            || membership.status == MembershipStatus::Accepted,
        "Membership {} is admin but status is {}",
        membership.id,
        membership.status
    );
}

/// Validate a message about to be persisted
pub fn assert_message_invariants(message: &Message) {
    debug_assert!(
        !message.content.trim().is_empty(),
        "Message {} has empty content",
        message.id
    );

    debug_assert!(
        message.sender_id != Uuid::nil(),
        "Message {} has nil sender_id",
        message.id
    );
}

/// Validate that only an accepted membership reaches the posting path
pub fn assert_can_post(membership: &Membership) {
    debug_assert!(
        membership.is_accepted(),
        "Membership {} with status {} reached the posting path",
        membership.id,
        membership.status
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_channel() -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: "general".to_string(),
            description: String::new(),
            creator_id: Uuid::new_v4(),
            is_private: false,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        }
    }

    #[test]
    fn test_valid_channel() {
        assert_channel_invariants(&make_channel());
    }

    #[test]
    #[should_panic(expected = "not lowercase")]
    fn test_uppercase_name_caught() {
        let mut channel = make_channel();
        channel.name = "General".to_string();
        assert_channel_invariants(&channel);
    }

    #[test]
    fn test_valid_membership() {
        let membership = Membership::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ChannelRole::Member,
            MembershipStatus::Pending,
        );
        assert_membership_invariants(&membership);
    }

    #[test]
    #[should_panic(expected = "is admin but status")]
    fn test_pending_admin_caught() {
        let membership = Membership::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ChannelRole::Admin,
            MembershipStatus::Pending,
        );
        assert_membership_invariants(&membership);
    }
}
