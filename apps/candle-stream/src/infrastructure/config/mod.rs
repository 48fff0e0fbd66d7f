//! Configuration Module
//!
//! Configuration loading for the candle stream client.

mod settings;

pub use settings::{
    BroadcastSettings, CandleSettings, CodecSettings, ConfigError, ConnectionSettings,
    ServerSettings, StreamConfig, URL_ENV,
};
