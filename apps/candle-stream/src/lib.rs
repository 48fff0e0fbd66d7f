#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Candle Stream - Real-time OHLCV Client
//!
//! Connects to a market data WebSocket, subscribes to one topic, decodes
//! `MessagePack` frames (JSON text frames as a fallback), aggregates price
//! ticks into fixed-interval candles, answers application-level pings, and
//! reconnects with a fixed delay up to a bounded number of attempts.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure logic with no I/O
//!   - `market`: Ticks, candles, display values
//!   - `candle`: Bucketing aggregator and bounded history
//!   - `connection`: Connection state machine as a pure transition function
//!   - `subscription`: Topic to subscribe to
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, render sink, frame handler
//!   - `services`: Message router, connection manager, stream session
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `codec`: `MessagePack` subset codec, JSON fallback
//!   - `websocket`: `tokio-tungstenite` transport
//!   - `broadcast`: Fan-out render sink
//!   - `config`: Environment configuration
//!   - `health`: Health check and metrics HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──► ConnectionManager ──► MessageRouter ──┬─► CandleAggregator
//!    ▲                                                │        │
//!    └──────────────── pong ◄─────────────────────────┘        ▼
//!                                                       BroadcastSink ──► Renderers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data types and pure state machines.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::candle::{AggregatorError, CandleAggregator, CandleHistory, IngestOutcome};
pub use domain::connection::{
    ConnectionEvent, ConnectionMachine, ConnectionState, Effect, ReconnectPolicy,
};
pub use domain::market::{Candle, MarketTick, TickDisplay, TickUpdate};
pub use domain::subscription::Subscription;

// Ports and services
pub use application::ports::{Frame, FrameHandler, RenderSink, Transport, TransportError};
pub use application::services::{
    ConnectionManager, Dispatch, MessageRouter, RoutingError, SessionError, StreamSession,
};

// Codec
pub use infrastructure::codec::{
    DecodeError, DecodeOptions, DecodedValue, EncodeMode, JsonCodec, MsgPackCodec,
    UnsupportedValueError,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamConfig};

// Adapters
pub use infrastructure::broadcast::{BroadcastSink, SinkEvent};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::websocket::WsTransport;

// Metrics
pub use infrastructure::metrics::{StatsSnapshot, StreamStats, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
