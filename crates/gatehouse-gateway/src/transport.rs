//! Message transports for the agent channel.
//!
//! The session engine is written against [`MessageTransport`], a
//! message-oriented bidirectional channel. Production traffic uses
//! [`WsTransport`] over `tokio-tungstenite`; in-process embedding and the
//! test suite use [`ChannelTransport`]. Wire framing beyond text messages
//! (TLS, compression) is the transport's problem, never the engine's.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// A transport-level failure.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// A bidirectional, message-oriented channel to one agent.
#[async_trait]
pub trait MessageTransport: Send {
    /// Receive the next text message.
    ///
    /// `None` means the peer closed the channel cleanly; `Some(Err(_))`
    /// means it failed.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the channel is gone.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel, best-effort.
    async fn close(&mut self);
}

/// WebSocket transport over an accepted TCP stream.
pub struct WsTransport {
    stream: WebSocketStream<TcpStream>,
}

impl WsTransport {
    /// Wrap an accepted WebSocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<TcpStream>) -> Self {
        Self { stream }
    }

    /// Close with a specific code and reason (e.g. a second concurrent
    /// agent connection).
    pub async fn close_with(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self.stream.close(Some(frame)).await;
    }
}

#[async_trait]
impl MessageTransport for WsTransport {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself; binary frames
                // are not part of the protocol.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {},
                Err(e) => return Some(Err(TransportError(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// In-process transport over a pair of mpsc channels.
///
/// [`ChannelTransport::pair`] returns the server-side transport plus the
/// client's handles: send inbound frames through the first, read replies
/// from the second.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Build a connected pair: `(server_transport, client_tx, client_rx)`.
    #[must_use]
    pub fn pair() -> (Self, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (client_tx, inbound) = mpsc::channel(64);
        let (outbound, client_rx) = mpsc::channel(64);
        (Self { inbound, outbound }, client_tx, client_rx)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| TransportError("channel closed".to_string()))
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}
