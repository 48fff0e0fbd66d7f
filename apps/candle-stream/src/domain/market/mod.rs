//! Market Data Types
//!
//! Core domain types for ticks and candles. These types are codec-agnostic
//! and represent the canonical internal representation of market data.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One price/volume observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTick {
    /// Instrument symbol, e.g. `BTC`.
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Rolling 24-hour volume snapshot. Not a per-tick delta.
    pub volume_24h: f64,
    /// Unix timestamp in whole seconds.
    pub timestamp_secs: i64,
}

/// An OHLCV bar for one interval-aligned bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    /// Bucket start in Unix seconds, a multiple of the interval.
    pub bucket_start: i64,
    /// First price in the bucket.
    pub open: f64,
    /// Highest price in the bucket.
    pub high: f64,
    /// Lowest price in the bucket.
    pub low: f64,
    /// Latest price in the bucket.
    pub close: f64,
    /// The latest `volume_24h` snapshot seen in the bucket.
    pub volume: f64,
}

impl Candle {
    /// Start a candle from its first tick.
    #[must_use]
    pub const fn open_at(bucket_start: i64, tick: &MarketTick) -> Self {
        Self {
            bucket_start,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume_24h,
        }
    }

    /// Fold another tick from the same bucket into this candle.
    pub fn apply(&mut self, tick: &MarketTick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        // volume_24h is a rolling snapshot, so replace instead of summing.
        self.volume = tick.volume_24h;
    }
}

/// Display fields that accompany every tick update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickDisplay {
    /// Last traded price.
    pub price: f64,
    /// Instrument symbol.
    pub symbol: String,
    /// Human-readable 24h volume, e.g. `1.23M`.
    #[serde(rename = "volume24hFormatted")]
    pub volume_24h_formatted: String,
    /// Time of the tick.
    #[serde(rename = "lastUpdateTimestamp")]
    pub last_update: DateTime<Utc>,
}

impl TickDisplay {
    /// Build display fields for a tick.
    ///
    /// Returns `None` if the tick's timestamp is outside `chrono`'s range.
    #[must_use]
    pub fn from_tick(tick: &MarketTick) -> Option<Self> {
        Some(Self {
            price: tick.price,
            symbol: tick.symbol.clone(),
            volume_24h_formatted: format_volume(tick.volume_24h),
            last_update: DateTime::from_timestamp(tick.timestamp_secs, 0)?,
        })
    }
}

/// Everything the rendering sink receives for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickUpdate {
    /// The in-progress candle after this tick.
    pub candle: Candle,
    /// Display fields of the tick.
    pub display: TickDisplay,
}

/// Format a volume with a K/M/B suffix and two decimals.
#[must_use]
pub fn format_volume(volume: f64) -> String {
    let magnitude = volume.abs();
    if magnitude >= 1e9 {
        format!("{:.2}B", volume / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.2}M", volume / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.2}K", volume / 1e3)
    } else {
        format!("{volume:.2}")
    }
}
