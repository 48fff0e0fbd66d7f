//! Prometheus Metrics Module
//!
//! Exposes session metrics in Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received by kind, frames dropped by reason
//! - **Keepalive**: pongs sent
//! - **Connection**: reconnect attempts, current state gauge
//! - **Candles**: candles finalized
//! - **Latency**: per-frame processing time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. The same
//! counts are mirrored in [`StreamStats`] so the JSON health endpoint can
//! report them without scraping.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "candle_stream_frames_received_total",
        "Total frames received from the market data server"
    );
    describe_counter!(
        "candle_stream_frames_dropped_total",
        "Total frames dropped by reason"
    );
    describe_counter!(
        "candle_stream_pongs_sent_total",
        "Total pong replies sent in response to ping"
    );
    describe_counter!(
        "candle_stream_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_counter!(
        "candle_stream_candles_finalized_total",
        "Total candles finalized into history"
    );
    describe_gauge!(
        "candle_stream_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 terminated)"
    );
    describe_histogram!(
        "candle_stream_frame_processing_seconds",
        "Time to decode and route one frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Binary frame failed to decode.
    Decode,
    /// Text frame was not valid JSON.
    Json,
    /// Payload shape did not match a known message.
    Malformed,
    /// Well-formed payload with an unhandled `type`.
    Unhandled,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Json => "json",
            Self::Malformed => "malformed",
            Self::Unhandled => "unhandled",
        }
    }
}

/// Record a frame received.
pub fn record_frame_received(kind: &'static str) {
    counter!("candle_stream_frames_received_total", "kind" => kind).increment(1);
}

/// Record a dropped frame.
pub fn record_frame_dropped(reason: DropReason) {
    counter!("candle_stream_frames_dropped_total", "reason" => reason.as_str()).increment(1);
}

/// Record a pong sent.
pub fn record_pong_sent() {
    counter!("candle_stream_pongs_sent_total").increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("candle_stream_reconnects_total").increment(1);
}

/// Record a finalized candle.
pub fn record_candle_finalized() {
    counter!("candle_stream_candles_finalized_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("candle_stream_connection_state").set(state.as_gauge());
}

/// Record frame processing duration.
pub fn record_processing_duration(kind: &'static str, duration: Duration) {
    histogram!("candle_stream_frame_processing_seconds", "kind" => kind)
        .record(duration.as_secs_f64());
}

// =============================================================================
// Session Stats
// =============================================================================

/// In-process counters mirrored from the Prometheus metrics.
///
/// Every `record_*` method updates both the atomic and the exporter.
#[derive(Debug, Default)]
pub struct StreamStats {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    pongs_sent: AtomicU64,
    reconnects: AtomicU64,
    candles_finalized: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Frames received.
    pub frames_received: u64,
    /// Frames dropped for any reason.
    pub frames_dropped: u64,
    /// Pongs sent.
    pub pongs_sent: u64,
    /// Reconnects scheduled.
    pub reconnects: u64,
    /// Candles finalized.
    pub candles_finalized: u64,
}

impl StreamStats {
    /// Create zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a received frame.
    pub fn record_frame_received(&self, kind: &'static str) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        record_frame_received(kind);
    }

    /// Count a dropped frame.
    pub fn record_frame_dropped(&self, reason: DropReason) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        record_frame_dropped(reason);
    }

    /// Count a pong.
    pub fn record_pong_sent(&self) {
        self.pongs_sent.fetch_add(1, Ordering::Relaxed);
        record_pong_sent();
    }

    /// Count a scheduled reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        record_reconnect();
    }

    /// Count a finalized candle.
    pub fn record_candle_finalized(&self) {
        self.candles_finalized.fetch_add(1, Ordering::Relaxed);
        record_candle_finalized();
    }

    /// Copy the current counts.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            pongs_sent: self.pongs_sent.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            candles_finalized: self.candles_finalized.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
