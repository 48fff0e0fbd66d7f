//! Port Interfaces
//!
//! Contracts between the session core and the outside world, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: duplex frame connection to the market data server
//! - [`RenderSink`]: receives candle snapshots and tick display fields
//!
//! ## Driver Ports (Inbound)
//!
//! - [`FrameHandler`]: consumes frames read by the connection driver

use async_trait::async_trait;

use crate::domain::market::{Candle, TickUpdate};

/// One message on the duplex connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Binary payload, decoded with the `MessagePack` subset.
    Binary(Vec<u8>),
    /// Text payload, decoded as JSON.
    Text(String),
}

impl Frame {
    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame kind for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Text(_) => "text",
        }
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Error while reading or writing on an open connection.
    #[error("stream error: {0}")]
    Stream(String),
    /// Operation attempted without an open connection.
    #[error("transport is not connected")]
    NotConnected,
}

/// Duplex connection primitive supplied by the host.
///
/// A transport holds at most one live connection. `open` replaces any
/// previous connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Open a connection to `url`.
    async fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Wait for the next inbound frame.
    ///
    /// Returns `None` when the remote side closed the connection cleanly.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection if open. Never fails.
    async fn close(&mut self);
}

/// Consumer of candle updates. Display only; nothing flows back.
#[cfg_attr(test, mockall::automock)]
pub trait RenderSink: Send {
    /// Called on every ingested tick with the current candle.
    fn on_tick(&mut self, update: &TickUpdate);

    /// Called when a candle is finalized into history.
    fn on_candle_finalized(&mut self, candle: &Candle);
}

/// Handles inbound frames inside the connection loop.
pub trait FrameHandler: Send {
    /// Process one frame. A returned frame is sent back before the next
    /// inbound frame is read.
    fn on_frame(&mut self, frame: Frame) -> Option<Frame>;
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn on_tick(&mut self, update: &TickUpdate) {
        (**self).on_tick(update);
    }

    fn on_candle_finalized(&mut self, candle: &Candle) {
        (**self).on_candle_finalized(candle);
    }
}
