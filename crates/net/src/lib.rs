//! Palaver Network Library
//!
//! The real-time side of the chat service: a TCP server that binds
//! authenticated connections to identities, routes channel rooms, and
//! runs the message and membership workflows, plus the client used to
//! talk to it.
//!
//! # Architecture
//!
//! - **Server**: accept loop; one reader task and one writer task per
//!   connection
//! - **Registry**: one live connection per identity, personal rooms
//! - **Rooms**: channel rooms, one per connection at a time
//! - **Service**: the operations behind every client request
//! - **Protocol**: length-prefixed JSON frames
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(7525, db).await?;
//!
//! let client = Client::connect(server.addr(), &session.token).await?;
//! client.send(ClientRequest::SelectChannel { channel_id, request_id: None }).await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ServerEvent::NewMessage { message } => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
mod connection;
pub mod error;
mod frame;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod service;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{ClientRequest, ServerEvent, UserHit};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use rooms::RoomRouter;
pub use server::Server;
pub use service::{ChatService, RequestCtx};

/// Default port for Palaver servers
pub const DEFAULT_PORT: u16 = 7525;
