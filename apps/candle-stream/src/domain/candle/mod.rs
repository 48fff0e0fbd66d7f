//! Candle Aggregation
//!
//! Folds a tick stream into interval-aligned OHLCV candles.
//!
//! # Design
//!
//! The aggregator owns exactly one in-progress candle and a bounded history
//! of finalized candles. A tick whose bucket differs from the current
//! candle's bucket finalizes the current candle and opens a new one.

use std::collections::VecDeque;

use super::market::{Candle, MarketTick};

/// Default candle interval in seconds.
pub const DEFAULT_INTERVAL_SECS: i64 = 60;

/// Default number of finalized candles retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Aggregator construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorError {
    /// Interval must be a positive number of seconds.
    #[error("candle interval must be positive, got {0}")]
    InvalidInterval(i64),
    /// History must hold at least one candle.
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
}

// =============================================================================
// Candle History
// =============================================================================

/// Bounded FIFO of finalized candles, oldest first.
#[derive(Debug, Clone)]
pub struct CandleHistory {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleHistory {
    /// Create an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, AggregatorError> {
        if capacity == 0 {
            return Err(AggregatorError::ZeroCapacity);
        }
        Ok(Self {
            candles: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a finalized candle, returning the evicted oldest entry if the
    /// history was full.
    pub fn push(&mut self, candle: Candle) -> Option<Candle> {
        let evicted = if self.candles.len() == self.capacity {
            self.candles.pop_front()
        } else {
            None
        };
        self.candles.push_back(candle);
        evicted
    }

    /// Number of retained candles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Whether no candle has been finalized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Maximum number of retained candles.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Most recently finalized candle.
    #[must_use]
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }
}

// =============================================================================
// Candle Aggregator
// =============================================================================

/// Result of ingesting one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOutcome {
    /// The in-progress candle after the tick.
    pub current: Candle,
    /// The candle closed by this tick, if it opened a new bucket.
    pub finalized: Option<Candle>,
}

/// Converts ticks into candles.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    interval_secs: i64,
    current: Option<Candle>,
    history: CandleHistory,
}

impl CandleAggregator {
    /// Create an aggregator.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval_secs` is not positive or
    /// `history_capacity` is zero.
    pub fn new(interval_secs: i64, history_capacity: usize) -> Result<Self, AggregatorError> {
        if interval_secs <= 0 {
            return Err(AggregatorError::InvalidInterval(interval_secs));
        }
        Ok(Self {
            interval_secs,
            current: None,
            history: CandleHistory::new(history_capacity)?,
        })
    }

    /// Bucket start for a timestamp. Floors toward negative infinity,
    /// saturating at `i64::MIN` for the few seconds below the lowest
    /// aligned bucket.
    #[must_use]
    pub const fn bucket_of(&self, timestamp_secs: i64) -> i64 {
        timestamp_secs.saturating_sub(timestamp_secs.rem_euclid(self.interval_secs))
    }

    /// Fold a tick into the current candle, finalizing it first if the tick
    /// belongs to a different bucket.
    pub fn ingest(&mut self, tick: &MarketTick) -> IngestOutcome {
        let bucket = self.bucket_of(tick.timestamp_secs);

        match self.current.as_mut() {
            Some(current) if current.bucket_start == bucket => {
                current.apply(tick);
                IngestOutcome {
                    current: *current,
                    finalized: None,
                }
            }
            _ => {
                let finalized = self.current.take();
                if let Some(closed) = finalized {
                    if bucket < closed.bucket_start {
                        tracing::debug!(
                            bucket,
                            previous = closed.bucket_start,
                            "Tick bucket precedes current candle"
                        );
                    }
                    if let Some(evicted) = self.history.push(closed) {
                        tracing::trace!(bucket_start = evicted.bucket_start, "Evicted candle");
                    }
                }
                let current = Candle::open_at(bucket, tick);
                self.current = Some(current);
                IngestOutcome { current, finalized }
            }
        }
    }

    /// The in-progress candle, if any tick has been ingested.
    #[must_use]
    pub const fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Finalized candles, oldest first.
    #[must_use]
    pub const fn history(&self) -> &CandleHistory {
        &self.history
    }

    /// Candle interval in seconds.
    #[must_use]
    pub const fn interval_secs(&self) -> i64 {
        self.interval_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tick(timestamp_secs: i64, price: f64) -> MarketTick {
        tick_with_volume(timestamp_secs, price, 1_000.0)
    }

    fn tick_with_volume(timestamp_secs: i64, price: f64, volume_24h: f64) -> MarketTick {
        MarketTick {
            symbol: "BTC".to_string(),
            price,
            volume_24h,
            timestamp_secs,
        }
    }

    fn candle(bucket_start: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start,
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn rejects_invalid_construction() {
        assert_eq!(
            CandleAggregator::new(0, 10).unwrap_err(),
            AggregatorError::InvalidInterval(0)
        );
        assert_eq!(
            CandleAggregator::new(60, 0).unwrap_err(),
            AggregatorError::ZeroCapacity
        );
    }

    #[test]
    fn three_tick_scenario() {
        let mut agg = CandleAggregator::new(60, DEFAULT_HISTORY_CAPACITY).unwrap();

        let first = agg.ingest(&tick(0, 100.0));
        assert_eq!(first.current, candle(0, 100.0, 100.0, 100.0, 100.0));
        assert!(first.finalized.is_none());

        let second = agg.ingest(&tick(30, 105.0));
        assert_eq!(second.current, candle(0, 100.0, 105.0, 100.0, 105.0));
        assert!(second.finalized.is_none());

        let third = agg.ingest(&tick(61, 102.0));
        assert_eq!(third.finalized, Some(candle(0, 100.0, 105.0, 100.0, 105.0)));
        assert_eq!(third.current, candle(60, 102.0, 102.0, 102.0, 102.0));
        assert_eq!(agg.history().len(), 1);
        assert_eq!(agg.current(), Some(&third.current));
    }

    #[test]
    fn volume_is_replaced_not_summed() {
        let mut agg = CandleAggregator::new(60, 10).unwrap();
        agg.ingest(&tick_with_volume(0, 1.0, 500.0));
        agg.ingest(&tick_with_volume(10, 1.0, 700.0));
        let outcome = agg.ingest(&tick_with_volume(20, 1.0, 650.0));

        assert_eq!(outcome.current.volume, 650.0);
    }

    #[test]
    fn negative_timestamps_floor() {
        let agg = CandleAggregator::new(60, 10).unwrap();
        assert_eq!(agg.bucket_of(-1), -60);
        assert_eq!(agg.bucket_of(-60), -60);
        assert_eq!(agg.bucket_of(59), 0);
        assert_eq!(agg.bucket_of(120), 120);
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let mut agg = CandleAggregator::new(60, 10).unwrap();
        assert_eq!(agg.bucket_of(i64::MIN), i64::MIN);
        assert_eq!(agg.bucket_of(i64::MAX) % 60, 0);

        let outcome = agg.ingest(&tick(i64::MIN, 1.0));
        assert_eq!(outcome.current.bucket_start, i64::MIN);
    }

    #[test]
    fn history_evicts_oldest() {
        let mut agg = CandleAggregator::new(60, 3).unwrap();
        for i in 0..5 {
            agg.ingest(&tick(i * 60, 1.0));
        }

        // Four finalized, capacity three: bucket 0 evicted.
        let buckets: Vec<i64> = agg.history().iter().map(|c| c.bucket_start).collect();
        assert_eq!(buckets, vec![60, 120, 180]);
        assert_eq!(agg.history().latest().map(|c| c.bucket_start), Some(180));
        assert_eq!(agg.current().map(|c| c.bucket_start), Some(240));
    }

    #[test]
    fn earlier_bucket_still_opens_new_candle() {
        let mut agg = CandleAggregator::new(60, 10).unwrap();
        agg.ingest(&tick(120, 1.0));
        let outcome = agg.ingest(&tick(30, 2.0));

        assert_eq!(outcome.finalized.map(|c| c.bucket_start), Some(120));
        assert_eq!(outcome.current.bucket_start, 0);
    }

    #[test]
    fn history_push_reports_eviction() {
        let mut history = CandleHistory::new(1).unwrap();
        assert!(history.is_empty());
        assert!(history.push(candle(0, 1.0, 1.0, 1.0, 1.0)).is_none());
        let evicted = history.push(candle(60, 1.0, 1.0, 1.0, 1.0));
        assert_eq!(evicted.map(|c| c.bucket_start), Some(0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }

    proptest! {
        #[test]
        fn finalized_buckets_strictly_increase(
            mut timestamps in prop::collection::vec(0_i64..100_000, 1..200),
            interval in 1_i64..600,
        ) {
            timestamps.sort_unstable();
            let mut agg = CandleAggregator::new(interval, 1_000).unwrap();
            let mut last: Option<i64> = None;

            for ts in timestamps {
                let outcome = agg.ingest(&tick(ts, 1.0));
                prop_assert_eq!(outcome.current.bucket_start, agg.bucket_of(ts));
                prop_assert_eq!(outcome.current.bucket_start % interval, 0);
                if let Some(done) = outcome.finalized {
                    if let Some(prev) = last {
                        prop_assert!(done.bucket_start >= prev + interval);
                    }
                    last = Some(done.bucket_start);
                }
            }
        }

        #[test]
        fn history_never_exceeds_capacity(
            capacity in 1_usize..20,
            buckets in 0_i64..100,
        ) {
            let mut agg = CandleAggregator::new(60, capacity).unwrap();
            for b in 0..buckets {
                agg.ingest(&tick(b * 60, 1.0));
                prop_assert!(agg.history().len() <= capacity);
            }
        }

        #[test]
        fn current_volume_tracks_latest_tick(
            volumes in prop::collection::vec(0.0_f64..1e9, 1..50),
        ) {
            let mut agg = CandleAggregator::new(3_600, 10).unwrap();
            for (i, volume) in volumes.iter().enumerate() {
                let ts = i64::try_from(i).unwrap();
                let outcome = agg.ingest(&tick_with_volume(ts, 1.0, *volume));
                prop_assert_eq!(outcome.current.volume, *volume);
            }
        }
    }
}
