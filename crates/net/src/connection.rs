//! Per-connection lifecycle
//!
//! Each accepted socket gets a reader loop (this module) and a writer
//! task fed by an unbounded queue. The first frame must authenticate;
//! everything after dispatches into the chat service.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use palaver_core::models::{Identity, MessageDisplay};
use palaver_core::AuthService;

use crate::error::Error;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientRequest, ServerEvent};
use crate::registry::ConnectionHandle;
use crate::service::{ChatService, RequestCtx};

/// Drive one client connection from accept to cleanup
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, service: Arc<ChatService>) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let identity = match authenticate(&mut reader, &service).await {
        Ok(identity) => identity,
        Err(reason) => {
            warn!(addr = %addr, reason = %reason, "Handshake rejected");
            let _ = write_frame(&mut writer, &ServerEvent::AuthRejected { reason }).await;
            return;
        }
    };

    let conn_id = Uuid::new_v4();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(writer_task(writer, event_rx));

    // Admission evicts any previous connection for this identity
    service
        .registry()
        .admit(ConnectionHandle {
            conn_id,
            identity: identity.clone(),
            sender: event_tx.clone(),
        })
        .await;

    let ctx = RequestCtx {
        conn_id,
        identity: identity.clone(),
        outbound: event_tx,
    };
    ctx.deliver(ServerEvent::Authenticated {
        identity: identity.clone(),
    });

    info!(addr = %addr, user_id = %identity.id, username = %identity.username, "Connection admitted");

    loop {
        match read_frame::<_, ClientRequest>(&mut reader).await {
            Ok(request) => dispatch(request, &ctx, &service).await,
            Err(Error::ConnectionClosed) => {
                debug!(user_id = %identity.id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(user_id = %identity.id, error = %e, "Read error");
                break;
            }
        }
    }

    // A connection that was evicted must not tear down its successor;
    // the registry checks ownership before removing
    service.rooms().leave_all(conn_id).await;
    service.registry().remove(identity.id, conn_id).await;

    // Dropping ctx closes the queue; the writer drains and exits
    drop(ctx);
    let _ = writer_handle.await;

    info!(user_id = %identity.id, "Connection closed and cleaned up");
}

/// Read and verify the opening authenticate frame. On failure nothing
/// has been registered yet, so there is no state to undo.
async fn authenticate(
    reader: &mut ReadHalf<TcpStream>,
    service: &ChatService,
) -> Result<Identity, String> {
    let first: ClientRequest = read_frame(reader)
        .await
        .map_err(|e| format!("invalid opening frame: {e}"))?;

    let token = match first {
        ClientRequest::Authenticate { token } => token,
        _ => return Err("first frame must authenticate".to_string()),
    };

    let db = service
        .database()
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    AuthService::resolve_token(&db, &token).map_err(|e| e.to_string())
}

/// Send queued events to the client. Terminates after an eviction
/// notice so the replaced connection's write half closes promptly.
async fn writer_task(
    mut writer: WriteHalf<TcpStream>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = rx.recv().await {
        let is_eviction = matches!(event, ServerEvent::Evicted { .. });
        if let Err(e) = write_frame(&mut writer, &event).await {
            debug!(error = %e, "Write failed");
            break;
        }
        if is_eviction {
            let _ = writer.shutdown().await;
            break;
        }
    }
}

/// Route one request into the service and acknowledge it when the
/// client asked for correlation. A send's ok ack carries the persisted
/// message.
async fn dispatch(request: ClientRequest, ctx: &RequestCtx, service: &ChatService) {
    fn none(_: ()) -> Option<MessageDisplay> {
        None
    }

    let (request_id, result) = match request {
        ClientRequest::Authenticate { .. } => {
            debug!(user_id = %ctx.identity.id, "Repeated authenticate ignored");
            return;
        }
        ClientRequest::JoinChannel {
            channel_id,
            request_id,
        } => (request_id, service.join_channel(ctx, channel_id).await.map(none)),
        ClientRequest::NewMessage {
            channel_id,
            content,
            request_id,
        } => (
            request_id,
            service.send_message(ctx, channel_id, content).await.map(Some),
        ),
        ClientRequest::DeleteMessage {
            message_id,
            request_id,
        } => (request_id, service.delete_message(ctx, message_id).await.map(none)),
        ClientRequest::SelectChannel {
            channel_id,
            request_id,
        } => (request_id, service.select_channel(ctx, channel_id).await.map(none)),
        ClientRequest::SearchChannels { term, request_id } => {
            (request_id, service.search_channels(ctx, &term).await.map(none))
        }
        ClientRequest::CreateChannel {
            name,
            description,
            is_private,
            request_id,
        } => (
            request_id,
            service
                .create_channel(ctx, &name, description, is_private)
                .await
                .map(none),
        ),
        ClientRequest::RequestJoin {
            channel_id,
            request_id,
        } => (request_id, service.request_join(ctx, channel_id).await.map(none)),
        ClientRequest::InviteUsers {
            channel_id,
            user_ids,
            request_id,
        } => (
            request_id,
            service.invite_users(ctx, channel_id, &user_ids).await.map(none),
        ),
        ClientRequest::AcceptInvite {
            channel_id,
            request_id,
        } => (request_id, service.accept_invite(ctx, channel_id).await.map(none)),
        ClientRequest::SearchUsers {
            query,
            channel_id,
            request_id,
        } => (
            request_id,
            service.search_users(ctx, &query, channel_id).await.map(none),
        ),
        ClientRequest::StartConversation {
            receiver_id,
            request_id,
        } => (
            request_id,
            service.start_conversation(ctx, receiver_id).await.map(none),
        ),
    };

    match result {
        Ok(message) => {
            if let Some(id) = request_id {
                ctx.deliver(ServerEvent::ack_ok(id, message));
            }
        }
        Err(e) => {
            // Fire-and-forget failures are logged and dropped
            warn!(user_id = %ctx.identity.id, error = %e, "Request failed");
            if let Some(id) = request_id {
                ctx.deliver(ServerEvent::ack_err(id, &e));
            }
        }
    }
}
