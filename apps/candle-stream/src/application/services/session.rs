//! Stream Session
//!
//! The explicit session object: one [`ConnectionManager`] and one
//! [`MessageRouter`] with a construction and shutdown lifecycle. All mutable
//! session state (connection, current candle, history) lives here and is
//! owned by the task that calls [`StreamSession::run`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::connection::ConnectionManager;
use super::router::MessageRouter;
use crate::application::ports::{RenderSink, Transport};
use crate::domain::candle::{AggregatorError, CandleAggregator};
use crate::domain::connection::ConnectionState;
use crate::infrastructure::codec::UnsupportedValueError;
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics::StreamStats;

/// Session construction errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Candle settings rejected.
    #[error("invalid candle settings: {0}")]
    Aggregator(#[from] AggregatorError),
    /// Subscription frame not representable with the configured codec.
    #[error("subscription frame cannot be encoded: {0}")]
    Subscription(#[from] UnsupportedValueError),
}

/// One streaming session.
pub struct StreamSession<T, S> {
    id: Uuid,
    manager: ConnectionManager<T>,
    router: MessageRouter<S>,
    stats: Arc<StreamStats>,
}

impl<T: Transport, S: RenderSink> StreamSession<T, S> {
    /// Create a session with fresh stats.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the candle settings are invalid or the
    /// subscription frame cannot be encoded.
    pub fn new(config: &StreamConfig, transport: T, sink: S) -> Result<Self, SessionError> {
        Self::with_stats(config, transport, sink, Arc::new(StreamStats::new()))
    }

    /// Create a session that records into shared stats.
    ///
    /// # Errors
    ///
    /// Same as [`StreamSession::new`].
    pub fn with_stats(
        config: &StreamConfig,
        transport: T,
        sink: S,
        stats: Arc<StreamStats>,
    ) -> Result<Self, SessionError> {
        let codec = config.codec.codec();
        let aggregator =
            CandleAggregator::new(config.candles.interval_secs, config.candles.history_capacity)?;

        let manager = ConnectionManager::new(
            config.connection.url.clone(),
            config.connection.subscription(),
            config.connection.reconnect_policy(),
            &codec,
            transport,
            Arc::clone(&stats),
        )?;
        let router = MessageRouter::new(codec, aggregator, sink, Arc::clone(&stats));

        Ok(Self {
            id: Uuid::new_v4(),
            manager,
            router,
            stats,
        })
    }

    /// Session identifier, attached to every log line of [`run`](Self::run).
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Cancelling this token performs shutdown from any task.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.manager.shutdown_token()
    }

    /// Watch the connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// The router, for inspecting aggregation state.
    #[must_use]
    pub const fn router(&self) -> &MessageRouter<S> {
        &self.router
    }

    /// The connection manager.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    /// Run until `Terminated`, by shutdown or reconnect budget exhaustion.
    pub async fn run(&mut self) -> ConnectionState {
        let span = tracing::info_span!("session", session_id = %self.id);
        let Self {
            manager, router, ..
        } = self;
        manager.run(router).instrument(span).await
    }

    /// Close the transport, cancel any pending reconnect and terminate.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        self.manager.shutdown().await;
    }
}
