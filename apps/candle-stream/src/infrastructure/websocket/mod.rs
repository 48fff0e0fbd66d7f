//! WebSocket Transport
//!
//! [`Transport`] adapter over `tokio-tungstenite`. Application frames map
//! to [`Frame`]s; protocol-level pings are answered here and never reach
//! the router.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Frame, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport. Holds at most one open stream.
#[derive(Default)]
pub struct WsTransport {
    stream: Option<WsStream>,
}

impl WsTransport {
    /// Create a transport with no open stream.
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    /// Whether a stream is currently open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("open", &self.is_open())
            .finish()
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Self::Binary(data.into()),
            Frame::Text(text) => Self::Text(text.into()),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&mut self, url: &str) -> Result<(), TransportError> {
        self.close().await;

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(url, "WebSocket opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .send(Message::from(frame))
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let stream = self.stream.as_mut()?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Some(Ok(Frame::Binary(data.to_vec()))),
                Some(Ok(Message::Text(text))) => return Some(Ok(Frame::Text(text.to_string()))),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        return Some(Err(TransportError::Stream(e.to_string())));
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(reason))) => {
                    tracing::debug!(?reason, "WebSocket closed by peer");
                    self.stream = None;
                    return None;
                }
                Some(Err(e)) => return Some(Err(TransportError::Stream(e.to_string()))),
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                tracing::trace!(error = %e, "WebSocket close handshake failed");
            }
        }
    }
}
