//! Data models for Palaver

mod user;
mod channel;
mod membership;
mod message;
mod conversation;

pub use user::*;
pub use channel::*;
pub use membership::*;
pub use message::*;
pub use conversation::*;
