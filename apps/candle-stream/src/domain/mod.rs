//! Domain Layer - Core market data types and business logic.
//!
//! This layer has no I/O. Types here are plain Rust with serialization
//! support for the rendering sink and health output.

/// Candle aggregation and bounded history.
pub mod candle;

/// Connection state machine and reconnect policy.
pub mod connection;

/// Ticks, candles and display fields.
pub mod market;

/// Session subscription topic.
pub mod subscription;
