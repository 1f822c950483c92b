//! Per-viewer connection handling
//!
//! A connection owns one hub subscription for its whole lifetime. Frames
//! flow out as JSON text messages; anything the viewer sends is ignored
//! apart from close frames, which end the session.

use std::net::SocketAddr;
use std::sync::Arc;

use async_tungstenite::tokio::accept_async;
use async_tungstenite::tungstenite::Message;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::hub::BroadcastHub;
use crate::server::config::ServerConfig;
use crate::server::message::FrameEvent;

/// A single viewer session
pub struct ViewerConnection {
    session_id: u64,
    peer_addr: SocketAddr,
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
}

impl ViewerConnection {
    /// Create a connection handler for an accepted socket
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: ServerConfig,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            config,
            hub,
        }
    }

    /// Session identifier assigned by the listener
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Upgrade the socket and stream frames until either side goes away
    pub async fn run(self, socket: TcpStream) -> Result<u64> {
        let ws = match timeout(self.config.handshake_timeout, accept_async(socket)).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(Error::Transport(format!("handshake failed: {}", e))),
            Err(_) => return Err(Error::Transport("handshake timed out".into())),
        };

        let (mut write, mut read) = ws.split();
        let (subscription, mut frames) = self.hub.subscribe();

        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            subscription = %subscription,
            "Viewer connected"
        );

        let mut sent = 0u64;
        let result: Result<()> = async {
            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        // Channel closes when the hub drops us as a slow subscriber
                        let Some(payload) = frame else {
                            tracing::debug!(session_id = self.session_id, "Subscription ended by hub");
                            return Ok(());
                        };

                        let text = FrameEvent::from_payload(&payload)
                            .to_json()
                            .map_err(|e| Error::Transport(e.to_string()))?;

                        match timeout(self.config.send_timeout, write.send(Message::text(text))).await {
                            Ok(Ok(())) => sent += 1,
                            Ok(Err(e)) => return Err(Error::Transport(format!("send failed: {}", e))),
                            Err(_) => return Err(Error::Transport("send timed out".into())),
                        }
                    }
                    incoming = read.next() => match incoming {
                        None | Some(Ok(Message::Close(_))) => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(Error::Transport(format!("read failed: {}", e))),
                    }
                }
            }
        }
        .await;

        self.hub.unregister(subscription);
        let _ = write.close(None).await;

        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            frames_sent = sent,
            "Viewer disconnected"
        );

        result.map(|()| sent)
    }
}
