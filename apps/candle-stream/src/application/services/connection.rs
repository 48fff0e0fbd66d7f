//! Connection Manager
//!
//! Drives the connection state machine against a [`Transport`]. One loop
//! multiplexes cancellation, the reconnect timer and inbound frames with
//! `tokio::select!`; effects returned by the pure transition function are
//! executed here, in order, and may feed further events back in.
//!
//! Every state change is published on a `watch` channel so the host can
//! observe `Terminated` without polling.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Frame, FrameHandler, Transport, TransportError};
use crate::domain::connection::{
    ConnectionEvent, ConnectionMachine, ConnectionState, Effect, ReconnectPolicy,
};
use crate::domain::subscription::Subscription;
use crate::infrastructure::codec::{MsgPackCodec, UnsupportedValueError, subscribe_message};
use crate::infrastructure::metrics::{StreamStats, set_connection_state};

/// What woke the loop.
enum Wake {
    Cancelled,
    Timer,
    Inbound(Option<Result<Frame, TransportError>>),
}

/// Owns the transport and the connection lifecycle.
pub struct ConnectionManager<T> {
    url: String,
    subscription: Subscription,
    subscribe_frame: Vec<u8>,
    transport: T,
    machine: ConnectionMachine,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    reconnect_at: Option<Instant>,
    stats: Arc<StreamStats>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager in `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedValueError`] if the subscription frame cannot be
    /// encoded with `codec`, e.g. a topic longer than the compact text limit.
    pub fn new(
        url: impl Into<String>,
        subscription: Subscription,
        policy: ReconnectPolicy,
        codec: &MsgPackCodec,
        transport: T,
        stats: Arc<StreamStats>,
    ) -> Result<Self, UnsupportedValueError> {
        let subscribe_frame = codec.encode(&subscribe_message(subscription.topic()))?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            url: url.into(),
            subscription,
            subscribe_frame,
            transport,
            machine: ConnectionMachine::new(policy),
            state_tx,
            cancel: CancellationToken::new(),
            reconnect_at: None,
            stats,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Consecutive failures since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.machine.attempts()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Token that shuts the loop down when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether a reconnect timer is armed.
    #[must_use]
    pub const fn has_pending_reconnect(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// The transport, for inspection.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect and process frames until `Terminated`.
    ///
    /// Returns the final state, which is always `Terminated`. Transport
    /// errors never surface here; they drive reconnects.
    pub async fn run<H: FrameHandler>(&mut self, handler: &mut H) -> ConnectionState {
        let cancel = self.cancel.clone();
        tracing::info!(url = %self.url, topic = %self.subscription, "Starting connection");

        if cancel.is_cancelled() {
            self.dispatch(ConnectionEvent::Shutdown).await;
        } else {
            self.dispatch(ConnectionEvent::Connect).await;
        }

        while !self.state().is_terminal() {
            let connected = self.state() == ConnectionState::Connected;
            let deadline = self.reconnect_at;

            let wake = tokio::select! {
                biased;
                () = cancel.cancelled() => Wake::Cancelled,
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Timer,
                inbound = self.transport.next_frame(), if connected => Wake::Inbound(inbound),
            };

            match wake {
                Wake::Cancelled => self.dispatch(ConnectionEvent::Shutdown).await,
                Wake::Timer => {
                    self.reconnect_at = None;
                    self.dispatch(ConnectionEvent::TimerElapsed).await;
                }
                Wake::Inbound(Some(Ok(frame))) => {
                    if let Some(reply) = handler.on_frame(frame) {
                        // Sent before the next read.
                        if let Err(e) = self.transport.send(reply).await {
                            tracing::warn!(error = %e, "Failed to send reply");
                            self.dispatch(ConnectionEvent::Failed(e.to_string())).await;
                        }
                    }
                }
                Wake::Inbound(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Transport error");
                    self.dispatch(ConnectionEvent::Failed(e.to_string())).await;
                }
                Wake::Inbound(None) => {
                    tracing::warn!("Connection closed by server");
                    self.dispatch(ConnectionEvent::Closed).await;
                }
            }
        }

        tracing::info!(attempts = self.attempts(), "Connection terminated");
        self.state()
    }

    /// Close the transport, cancel any pending reconnect and terminate.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.dispatch(ConnectionEvent::Shutdown).await;
    }

    /// Send a frame on the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] unless `Connected`, or the
    /// transport's send error.
    pub async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.transport.send(frame).await
    }

    /// Apply an event and run effects until no further events are produced.
    async fn dispatch(&mut self, event: ConnectionEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let before = self.state();
            let effects = self.machine.handle(&event);
            let after = self.state();
            if before != after {
                self.publish(after);
            }

            for effect in effects {
                if let Some(next) = self.execute(effect).await {
                    pending.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<ConnectionEvent> {
        match effect {
            Effect::OpenTransport => {
                let cancel = self.cancel.clone();
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Some(ConnectionEvent::Shutdown),
                    result = self.transport.open(&self.url) => result,
                };
                match result {
                    Ok(()) => {
                        tracing::info!(url = %self.url, "Connected");
                        Some(ConnectionEvent::Opened)
                    }
                    Err(e) => {
                        tracing::warn!(url = %self.url, error = %e, "Connection attempt failed");
                        Some(ConnectionEvent::Failed(e.to_string()))
                    }
                }
            }
            Effect::SendSubscribe => {
                let frame = Frame::Binary(self.subscribe_frame.clone());
                match self.transport.send(frame).await {
                    Ok(()) => {
                        tracing::info!(topic = %self.subscription, "Subscribed");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to send subscription");
                        Some(ConnectionEvent::Failed(e.to_string()))
                    }
                }
            }
            Effect::ScheduleReconnect(delay) => {
                self.reconnect_at = Some(Instant::now() + delay);
                self.stats.record_reconnect();
                tracing::info!(
                    attempt = self.attempts(),
                    max_attempts = self.machine.policy().max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                None
            }
            Effect::CancelReconnect => {
                if self.reconnect_at.take().is_some() {
                    tracing::debug!("Cancelled pending reconnect");
                }
                None
            }
            Effect::CloseTransport => {
                self.transport.close().await;
                None
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        set_connection_state(state);
        self.state_tx.send_replace(state);
    }
}
