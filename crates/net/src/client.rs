//! TCP client for the chat server
//!
//! Connects, authenticates with a bearer token, then exposes the event
//! stream and a request sender. Used by the integration suite and by
//! anything embedding a headless client.

use std::net::SocketAddr;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use palaver_core::models::Identity;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientRequest, ServerEvent};

/// Connected client handle
pub struct Client {
    identity: Identity,
    event_rx: mpsc::Receiver<ServerEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(ClientRequest),
    Disconnect,
}

impl Client {
    /// Connect and authenticate. The server's first frame decides:
    /// `authenticated` yields a client, `auth rejected` is an error.
    pub async fn connect(addr: SocketAddr, token: &str) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(
            &mut writer,
            &ClientRequest::Authenticate {
                token: token.to_string(),
            },
        )
        .await?;

        let identity = match read_frame::<_, ServerEvent>(&mut reader).await? {
            ServerEvent::Authenticated { identity } => identity,
            ServerEvent::AuthRejected { reason } => return Err(Error::Rejected(reason)),
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected first frame: {:?}",
                    other
                )))
            }
        };

        info!(user_id = %identity.id, username = %identity.username, "Authenticated");

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(connection_task(reader, writer, event_tx, cmd_rx));

        Ok(Client {
            identity,
            event_rx,
            cmd_tx,
        })
    }

    /// The identity the server bound this connection to
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Queue a request
    pub async fn send(&self, request: ClientRequest) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(request))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Next server event; None when the connection is gone
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    /// Read events until the ack for `request_id` arrives, discarding
    /// everything else. Use `next_event` when intermediate events
    /// matter.
    pub async fn wait_ack(&mut self, request_id: Uuid) -> Option<ServerEvent> {
        while let Some(event) = self.next_event().await {
            match &event {
                ServerEvent::Ack {
                    request_id: acked, ..
                } if *acked == request_id => return Some(event),
                other => debug!(event = ?other, "Skipping event while waiting for ack"),
            }
        }
        None
    }

    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }
}

/// Pump frames in both directions until either side closes
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame::<_, ServerEvent>(&mut reader) => {
                match result {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(request)) => {
                        if let Err(e) = write_frame(&mut writer, &request).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    info!("Disconnected from server");
}
