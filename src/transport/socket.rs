//! WebSocket endpoint.
//!
//! Carries [`BridgeMessage`]s between processes, e.g. between a native host
//! and the extension background, as JSON text frames. Each side gets a
//! [`SocketPort`] (a [`MessagePort`] whose only reachable context is the
//! peer) and an [`Inbox`] fed by the connection's event loop.
//!
//! # Connection Flow
//!
//! 1. [`SocketListener::bind`] on `localhost:0` (random port)
//! 2. The peer connects to [`SocketListener::ws_url`] (or use [`connect`])
//! 3. [`SocketListener::accept`] upgrades and records the peer's `Origin`
//! 4. Both sides exchange messages until either closes

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ContextId;
use crate::protocol::BridgeMessage;

use super::channel::{Inbound, Inbox, MessagePort, TargetOrigin};
use super::trust::normalize_origin;

// ============================================================================
// Constants
// ============================================================================

/// Time to wait for the peer to connect.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Origin reported for peers that sent no `Origin` header.
const OPAQUE_ORIGIN: &str = "null";

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send a message to the peer.
    Post(BridgeMessage),
    /// Close the connection.
    Shutdown,
}

// ============================================================================
// SocketListener
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
pub struct SocketListener {
    listener: TcpListener,
    port: u16,
}

impl SocketListener {
    /// Binds to `ip:port`. Use port 0 for a random port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let port = listener.local_addr()?.port();

        debug!(port, "Bridge socket bound");

        Ok(Self { listener, port })
    }

    /// Binds to a random localhost port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_localhost() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the URL peers connect to: `ws://127.0.0.1:{port}`.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accepts one peer.
    ///
    /// # Errors
    ///
    /// - [`Error::Delivery`] if no peer connects within 30s or the upgrade fails
    /// - [`Error::Io`] if the TCP accept fails
    pub async fn accept(self) -> Result<(SocketPort, Inbox)> {
        let (stream, addr) = timeout(ACCEPT_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| {
                Error::delivery(format!(
                    "no peer connected within {}s",
                    ACCEPT_TIMEOUT.as_secs()
                ))
            })??;

        debug!(?addr, "TCP connection accepted");

        let mut peer_origin = None;
        let record_origin =
            |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
                peer_origin = req
                    .headers()
                    .get("origin")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(resp)
            };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, record_origin)
            .await
            .map_err(|e| Error::delivery(format!("WebSocket upgrade failed: {e}")))?;

        let peer_origin = peer_origin
            .as_deref()
            .and_then(normalize_origin)
            .unwrap_or_else(|| OPAQUE_ORIGIN.to_string());

        info!(port = self.port, %peer_origin, "Bridge socket connected");

        Ok(SocketPort::spawn(ws_stream, self.ws_url(), peer_origin))
    }
}

/// Connects to a bridge socket at `url`.
///
/// # Errors
///
/// Returns [`Error::WebSocket`] if the connection or handshake fails.
pub async fn connect(url: &str) -> Result<(SocketPort, Inbox)> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let peer_origin = normalize_origin(url).unwrap_or_else(|| OPAQUE_ORIGIN.to_string());

    info!(url, "Connected to bridge socket");

    Ok(SocketPort::spawn(ws_stream, OPAQUE_ORIGIN.to_string(), peer_origin))
}

// ============================================================================
// SocketPort
// ============================================================================

/// [`MessagePort`] over one WebSocket connection.
///
/// Cloning is cheap; clones share the connection. Dropping a port does not
/// close the connection; call [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct SocketPort {
    id: ContextId,
    origin: String,
    peer: ContextId,
    peer_origin: String,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketPort {
    fn spawn<S>(ws_stream: WebSocketStream<S>, origin: String, peer_origin: String) -> (Self, Inbox)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbox) = mpsc::unbounded_channel();
        let peer = ContextId::next();

        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            inbound_tx,
            peer,
            peer_origin.clone(),
        ));

        let port = Self {
            id: ContextId::next(),
            origin,
            peer,
            peer_origin,
            command_tx,
        };
        (port, inbox)
    }

    /// The context standing for the remote side.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> ContextId {
        self.peer
    }

    /// The remote side's origin.
    #[inline]
    #[must_use]
    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }

    /// Closes the connection. The inbox ends once the event loop exits.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

impl MessagePort for SocketPort {
    fn context(&self) -> ContextId {
        self.id
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn post(&self, target: ContextId, message: BridgeMessage, origin: TargetOrigin) -> Result<()> {
        if target != self.peer {
            return Err(Error::delivery(format!("context {target} is not reachable over this socket")));
        }
        if !origin.admits(&self.peer_origin) {
            trace!(%target, target_origin = %origin, "Target origin mismatch, message dropped");
            return Ok(());
        }
        self.command_tx
            .send(SocketCommand::Post(message))
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

async fn run_event_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    peer: ContextId,
    peer_origin: String,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message = match serde_json::from_str::<BridgeMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse bridge frame");
                                continue;
                            }
                        };
                        let inbound = Inbound {
                            source: peer,
                            origin: peer_origin.clone(),
                            message,
                        };
                        if inbound_tx.send(inbound).is_err() {
                            debug!("Inbox dropped");
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("Bridge socket closed by peer");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Bridge socket error");
                        break;
                    }

                    None => {
                        debug!("Bridge socket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Post(message)) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize bridge message");
                                continue;
                            }
                        };
                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            warn!(error = %e, request_id = %message.request_id(), "Failed to send frame");
                            break;
                        }
                        trace!(kind = message.kind(), request_id = %message.request_id(), "Frame sent");
                    }

                    Some(SocketCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                }
            }
        }
    }

    debug!("Bridge socket event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
