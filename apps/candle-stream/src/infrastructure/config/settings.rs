//! Stream Client Configuration Settings
//!
//! Configuration types for the candle stream client, loaded from environment
//! variables. Unparseable numeric values fall back to their defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::candle::{DEFAULT_HISTORY_CAPACITY, DEFAULT_INTERVAL_SECS};
use crate::domain::connection::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RECONNECT_DELAY, ReconnectPolicy};
use crate::domain::subscription::{DEFAULT_TOPIC, Subscription};
use crate::infrastructure::codec::{DecodeOptions, EncodeMode, MsgPackCodec};

/// Environment variable holding the server URL.
pub const URL_ENV: &str = "CANDLE_STREAM_URL";

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// WebSocket URL of the market data server.
    pub url: String,
    /// Topic subscribed on every open.
    pub topic: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failures before terminating.
    pub max_reconnect_attempts: u32,
}

impl ConnectionSettings {
    /// Settings for `url` with default topic and retry policy.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: DEFAULT_TOPIC.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Retry policy for the connection state machine.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect_delay, self.max_reconnect_attempts)
    }

    /// Subscription for the configured topic.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription::new(self.topic.clone())
    }
}

/// Candle aggregation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleSettings {
    /// Candle interval in seconds.
    pub interval_secs: i64,
    /// Finalized candles retained in memory.
    pub history_capacity: usize,
}

impl Default for CandleSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Codec policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecSettings {
    /// Substitute Nil for malformed values instead of rejecting the frame.
    pub lenient_decode: bool,
    /// Allow floats, wide integers and 16-bit lengths when encoding.
    pub extended_encode: bool,
}

impl CodecSettings {
    /// Build the binary codec for these settings.
    #[must_use]
    pub const fn codec(&self) -> MsgPackCodec {
        let decode = if self.lenient_decode {
            DecodeOptions::lenient()
        } else {
            DecodeOptions::strict()
        };
        let encode = if self.extended_encode {
            EncodeMode::Extended
        } else {
            EncodeMode::Compact
        };
        MsgPackCodec::with_options(decode, encode)
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Capacity of the sink event channel.
    pub capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self { capacity: 1_024 }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Connection settings.
    pub connection: ConnectionSettings,
    /// Candle settings.
    pub candles: CandleSettings,
    /// Codec settings.
    pub codec: CodecSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
}

impl StreamConfig {
    /// Configuration for `url` with every other value at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionSettings::new(url),
            candles: CandleSettings::default(),
            codec: CodecSettings::default(),
            server: ServerSettings::default(),
            broadcast: BroadcastSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `CANDLE_STREAM_URL` is missing or empty, or if a
    /// size or interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StreamConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(URL_ENV).ok_or_else(|| ConfigError::MissingEnvVar(URL_ENV.to_string()))?;
        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue(URL_ENV.to_string()));
        }

        let defaults = Self::new(url.trim());

        let topic = lookup("CANDLE_STREAM_TOPIC")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(defaults.connection.topic);

        let connection = ConnectionSettings {
            url: defaults.connection.url,
            topic,
            reconnect_delay: parse_duration_millis(
                &lookup,
                "CANDLE_RECONNECT_DELAY_MS",
                defaults.connection.reconnect_delay,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "CANDLE_MAX_RECONNECT_ATTEMPTS",
                defaults.connection.max_reconnect_attempts,
            ),
        };

        let candles = CandleSettings {
            interval_secs: parse_or(
                &lookup,
                "CANDLE_INTERVAL_SECS",
                defaults.candles.interval_secs,
            ),
            history_capacity: parse_or(
                &lookup,
                "CANDLE_HISTORY_CAPACITY",
                defaults.candles.history_capacity,
            ),
        };

        let codec = CodecSettings {
            lenient_decode: parse_bool(&lookup, "CANDLE_LENIENT_DECODE", false),
            extended_encode: parse_bool(&lookup, "CANDLE_EXTENDED_ENCODE", false),
        };

        let server = ServerSettings {
            health_port: parse_or(&lookup, "CANDLE_HEALTH_PORT", defaults.server.health_port),
        };

        let broadcast = BroadcastSettings {
            capacity: parse_or(
                &lookup,
                "CANDLE_BROADCAST_CAPACITY",
                defaults.broadcast.capacity,
            ),
        };

        let config = Self {
            connection,
            candles,
            codec,
            server,
            broadcast,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at construction.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candles.interval_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "CANDLE_INTERVAL_SECS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.candles.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CANDLE_HISTORY_CAPACITY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.broadcast.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CANDLE_BROADCAST_CAPACITY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable holds an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| {
        matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<StreamConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StreamConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_url() {
        let config = config_from(&[(URL_ENV, "wss://example.test/ws")]).unwrap();

        assert_eq!(config.connection.url, "wss://example.test/ws");
        assert_eq!(config.connection.topic, "market.data@BTC");
        assert_eq!(config.connection.reconnect_delay, Duration::from_millis(3_000));
        assert_eq!(config.connection.max_reconnect_attempts, 10);
        assert_eq!(config.candles.interval_secs, 60);
        assert_eq!(config.candles.history_capacity, 500);
        assert!(!config.codec.lenient_decode);
        assert!(!config.codec.extended_encode);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.broadcast.capacity, 1_024);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            (URL_ENV, "ws://localhost:9000"),
            ("CANDLE_STREAM_TOPIC", "market.data@ETH"),
            ("CANDLE_INTERVAL_SECS", "300"),
            ("CANDLE_MAX_RECONNECT_ATTEMPTS", "3"),
            ("CANDLE_RECONNECT_DELAY_MS", "250"),
            ("CANDLE_HISTORY_CAPACITY", "50"),
            ("CANDLE_LENIENT_DECODE", "true"),
            ("CANDLE_EXTENDED_ENCODE", "1"),
            ("CANDLE_HEALTH_PORT", "0"),
        ])
        .unwrap();

        assert_eq!(config.connection.subscription().topic(), "market.data@ETH");
        assert_eq!(
            config.connection.reconnect_policy(),
            ReconnectPolicy::new(Duration::from_millis(250), 3)
        );
        assert_eq!(config.candles.interval_secs, 300);
        assert_eq!(config.candles.history_capacity, 50);
        assert!(config.codec.codec().decode_options().lenient);
        assert_eq!(config.codec.codec().encode_mode(), EncodeMode::Extended);
        assert_eq!(config.server.health_port, 0);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config_from(&[
            (URL_ENV, "ws://localhost"),
            ("CANDLE_INTERVAL_SECS", "soon"),
            ("CANDLE_RECONNECT_DELAY_MS", "-5"),
        ])
        .unwrap();
        assert_eq!(config.candles.interval_secs, 60);
        assert_eq!(config.connection.reconnect_delay, Duration::from_millis(3_000));
    }

    #[test]
    fn missing_url() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::MissingEnvVar(key)) if key == URL_ENV
        ));
    }

    #[test]
    fn empty_url() {
        assert!(matches!(
            config_from(&[(URL_ENV, "  ")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(matches!(
            config_from(&[(URL_ENV, "ws://x"), ("CANDLE_INTERVAL_SECS", "0")]),
            Err(ConfigError::InvalidValue { key, .. }) if key == "CANDLE_INTERVAL_SECS"
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            config_from(&[(URL_ENV, "ws://x"), ("CANDLE_HISTORY_CAPACITY", "0")]),
            Err(ConfigError::InvalidValue { key, .. }) if key == "CANDLE_HISTORY_CAPACITY"
        ));
    }

    #[test]
    fn default_codec_is_strict_compact() {
        let codec = CodecSettings::default().codec();
        assert!(!codec.decode_options().lenient);
        assert_eq!(codec.encode_mode(), EncodeMode::Compact);
    }
}
