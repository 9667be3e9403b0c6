//! Palaver Core Library
//!
//! Domain models, SQLite storage, and the auth/session service for the
//! Palaver group-chat platform.

pub mod auth;
pub mod error;
pub mod invariants;
pub mod models;
pub mod storage;

pub use auth::AuthService;
pub use error::{Error, Result};
pub use models::*;
pub use storage::{
    ChannelRepository, ConversationRepository, Database, MembershipRepository, MessageRepository,
    Storage, UserRepository,
};
