//! Broadcast Sink
//!
//! A [`RenderSink`] that fans candle updates out over a tokio broadcast
//! channel so any number of downstream renderers can subscribe.
//!
//! # Architecture
//!
//! The sink keeps one channel of [`SinkEvent`]s. Sending never blocks the
//! connection loop: with no receivers the event is discarded, and a slow
//! receiver lags rather than applying backpressure. The latest tick update
//! is also kept behind a lock for the health endpoint.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::application::ports::RenderSink;
use crate::domain::market::{Candle, TickUpdate};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1_024;

// =============================================================================
// Sink Events
// =============================================================================

/// One notification for downstream renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    /// The current candle changed.
    Tick(TickUpdate),
    /// A candle was finalized into history.
    CandleFinalized(Candle),
}

// =============================================================================
// Broadcast Sink
// =============================================================================

/// Fan-out sink. Cloning shares the channel and the latest snapshot.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SinkEvent>,
    latest: Arc<RwLock<Option<TickUpdate>>>,
}

impl BroadcastSink {
    /// Create a sink with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, like [`broadcast::channel`]. Config
    /// validation rejects zero before this is reached.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a sink with default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// The most recent tick update, if any.
    #[must_use]
    pub fn latest(&self) -> Option<TickUpdate> {
        self.latest.read().clone()
    }

    fn publish(&self, event: SinkEvent) {
        // Err only means nobody is listening.
        if self.tx.send(event).is_err() {
            tracing::trace!("No sink receivers");
        }
    }
}

impl RenderSink for BroadcastSink {
    fn on_tick(&mut self, update: &TickUpdate) {
        *self.latest.write() = Some(update.clone());
        self.publish(SinkEvent::Tick(update.clone()));
    }

    fn on_candle_finalized(&mut self, candle: &Candle) {
        self.publish(SinkEvent::CandleFinalized(*candle));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::domain::market::TickDisplay;

    fn candle(bucket_start: i64) -> Candle {
        Candle {
            bucket_start,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
        }
    }

    fn update() -> TickUpdate {
        TickUpdate {
            candle: candle(60),
            display: TickDisplay {
                price: 1.5,
                symbol: "BTC".to_string(),
                volume_24h_formatted: "10.00".to_string(),
                last_update: DateTime::from_timestamp(61, 0).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn events_reach_every_receiver() {
        let mut sink = BroadcastSink::new(16);
        let mut rx1 = sink.subscribe();
        let mut rx2 = sink.subscribe();
        assert_eq!(sink.receiver_count(), 2);

        sink.on_candle_finalized(&candle(0));
        sink.on_tick(&update());

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.recv().await.unwrap(), SinkEvent::CandleFinalized(candle(0)));
            assert_eq!(rx.recv().await.unwrap(), SinkEvent::Tick(update()));
        }
    }

    #[test]
    fn send_without_receivers_is_fine() {
        let mut sink = BroadcastSink::with_defaults();
        sink.on_tick(&update());
        assert_eq!(sink.latest(), Some(update()));
    }

    #[test]
    fn clones_share_latest() {
        let mut sink = BroadcastSink::new(4);
        let observer = sink.clone();
        assert!(observer.latest().is_none());

        sink.on_tick(&update());
        assert_eq!(observer.latest().map(|u| u.candle.bucket_start), Some(60));
    }

    #[tokio::test]
    async fn slow_receiver_lags() {
        let mut sink = BroadcastSink::new(2);
        let mut rx = sink.subscribe();
        for i in 0..4 {
            sink.on_candle_finalized(&candle(i * 60));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap(), SinkEvent::CandleFinalized(candle(120)));
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_string(&SinkEvent::CandleFinalized(candle(0))).unwrap();
        assert!(json.starts_with(r#"{"event":"candle_finalized""#));
    }
}
