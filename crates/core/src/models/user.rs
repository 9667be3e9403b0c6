//! User account and session models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

/// The read-only identity snapshot bound to a live connection.
///
/// Resolved from a bearer token at handshake time and never mutated
/// afterwards; handlers receive it by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// Bearer session for a logged-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, token: String, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            token,
            user_id,
            created_at: now,
            expires_at: now + duration,
        }
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Remaining lifetime, clamped at zero for expired sessions
    pub fn time_to_expiry(&self) -> chrono::Duration {
        (self.expires_at - Utc::now()).max(chrono::Duration::zero())
    }
}
