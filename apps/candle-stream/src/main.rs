//! Candle Stream Binary
//!
//! Starts the candle stream client.
//!
//! # Usage
//!
//! ```bash
//! CANDLE_STREAM_URL=wss://example.com/ws cargo run --bin candle-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CANDLE_STREAM_URL`: WebSocket endpoint
//!
//! ## Optional
//! - `CANDLE_STREAM_TOPIC`: Subscription topic (default: market.data@BTC)
//! - `CANDLE_INTERVAL_SECS`: Candle interval (default: 60)
//! - `CANDLE_HISTORY_CAPACITY`: Finalized candles kept (default: 500)
//! - `CANDLE_RECONNECT_DELAY_MS`: Fixed reconnect delay (default: 3000)
//! - `CANDLE_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 10)
//! - `CANDLE_LENIENT_DECODE`: Substitute nil for malformed values and ignore
//!   trailing bytes instead of dropping the frame (default: false)
//! - `CANDLE_EXTENDED_ENCODE`: Allow float64, 32-bit integers and 16-bit
//!   string/array/map lengths when encoding (default: false)
//! - `CANDLE_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `CANDLE_BROADCAST_CAPACITY`: Sink channel capacity (default: 1024)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use candle_stream::infrastructure::broadcast::{BroadcastSink, SinkEvent};
use candle_stream::infrastructure::health::{HealthServer, HealthServerState};
use candle_stream::infrastructure::telemetry;
use candle_stream::{StreamConfig, StreamSession, StreamStats, WsTransport, init_metrics};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Candle Stream");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let sink = BroadcastSink::new(config.broadcast.capacity);
    let stats = Arc::new(StreamStats::new());

    let mut session =
        StreamSession::with_stats(&config, WsTransport::new(), sink.clone(), Arc::clone(&stats))?;
    tracing::info!(session_id = %session.id(), "Session created");

    let services_token = CancellationToken::new();

    // Spawn health server
    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            session.state(),
            Arc::clone(&stats),
            sink.clone(),
        ));
        let health_server =
            HealthServer::new(config.server.health_port, health_state, services_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Spawn candle logger
    tokio::spawn(log_sink_events(sink.subscribe(), services_token.clone()));

    // Spawn signal listener
    tokio::spawn(await_shutdown(session.shutdown_token()));

    let final_state = session.run().await;
    session.shutdown().await;
    services_token.cancel();

    let snapshot = stats.snapshot();
    tracing::info!(
        state = %final_state,
        frames_received = snapshot.frames_received,
        frames_dropped = snapshot.frames_dropped,
        candles_finalized = snapshot.candles_finalized,
        "Candle Stream stopped"
    );
    Ok(())
}

/// Log sink events until cancelled or the sink is dropped.
async fn log_sink_events(mut rx: broadcast::Receiver<SinkEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = rx.recv() => event,
        };

        match event {
            Ok(SinkEvent::Tick(update)) => {
                tracing::debug!(
                    symbol = %update.display.symbol,
                    price = update.display.price,
                    volume_24h = %update.display.volume_24h_formatted,
                    bucket_start = update.candle.bucket_start,
                    "Tick"
                );
            }
            Ok(SinkEvent::CandleFinalized(candle)) => {
                tracing::info!(
                    bucket_start = candle.bucket_start,
                    open = candle.open,
                    high = candle.high,
                    low = candle.low,
                    close = candle.close,
                    volume = candle.volume,
                    "Candle closed"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Candle logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        topic = %config.connection.topic,
        interval_secs = config.candles.interval_secs,
        history_capacity = config.candles.history_capacity,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        url = %config.connection.url,
        reconnect_delay = ?config.connection.reconnect_delay,
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        lenient_decode = config.codec.lenient_decode,
        extended_encode = config.codec.extended_encode,
        "Connection settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT), then cancel the session.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
