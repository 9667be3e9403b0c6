//! TCP chat server
//!
//! Owns the accept loop; every accepted socket is handed to the
//! per-connection handler, which shares one chat service.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use palaver_core::Database;

use crate::connection::handle_connection;
use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomRouter;
use crate::service::ChatService;

/// Running server handle
pub struct Server {
    addr: SocketAddr,
    service: Arc<ChatService>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the given port (0 picks a free one) and start accepting
    pub async fn start(port: u16, db: Arc<Mutex<Database>>) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let service = Arc::new(ChatService::new(
            db,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RoomRouter::new()),
        ));

        tokio::spawn(accept_loop(
            listener,
            service.clone(),
            shutdown_tx.subscribe(),
        ));

        Ok(Server {
            addr: bound_addr,
            service,
            shutdown_tx,
        })
    }

    /// The server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn service(&self) -> &Arc<ChatService> {
        &self.service
    }

    pub async fn connection_count(&self) -> usize {
        self.service.registry().connection_count().await
    }

    /// Stop accepting new connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections until shutdown
async fn accept_loop(
    listener: TcpListener,
    service: Arc<ChatService>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(stream, addr, service.clone()));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}
