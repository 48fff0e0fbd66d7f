//! Message Router
//!
//! Dispatches decoded payloads by their `type` field:
//!
//! - `market_data`: parse a [`MarketTick`] from `data`, ingest it, and
//!   forward the candle and display fields to the sink
//! - `ping`: encode `{type: "pong"}` and hand it back for immediate send
//!
//! Everything else is dropped. Routing never returns an error to the
//! connection loop; failures are logged and counted.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::application::ports::{Frame, FrameHandler, RenderSink};
use crate::domain::candle::{CandleAggregator, IngestOutcome};
use crate::domain::market::{MarketTick, TickDisplay, TickUpdate};
use crate::infrastructure::codec::{
    DecodedValue, JsonCodec, MsgPackCodec, UnsupportedValueError, pong_message,
};
use crate::infrastructure::metrics::{DropReason, StreamStats, record_processing_duration};

/// Payload `type` for market data.
pub const MARKET_DATA_TYPE: &str = "market_data";

/// Payload `type` for keepalive requests.
pub const PING_TYPE: &str = "ping";

/// Malformed payload shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    /// Top-level payload is not a mapping.
    #[error("payload is not a mapping (got {0})")]
    NotAMapping(&'static str),
    /// Required field absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// Field present with the wrong type or an unparseable value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// Reply could not be encoded.
    #[error("failed to encode reply: {0}")]
    Encode(#[from] UnsupportedValueError),
}

/// What the router did with a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A tick was ingested.
    Tick(IngestOutcome),
    /// A pong must be sent.
    Reply(Vec<u8>),
    /// Payload carried no handled `type`.
    Ignored(Option<String>),
}

/// Routes decoded payloads to the aggregator and sink.
pub struct MessageRouter<S> {
    codec: MsgPackCodec,
    json: JsonCodec,
    aggregator: CandleAggregator,
    sink: S,
    stats: Arc<StreamStats>,
}

impl<S: RenderSink> MessageRouter<S> {
    /// Create a router.
    #[must_use]
    pub const fn new(
        codec: MsgPackCodec,
        aggregator: CandleAggregator,
        sink: S,
        stats: Arc<StreamStats>,
    ) -> Self {
        Self {
            codec,
            json: JsonCodec::new(),
            aggregator,
            sink,
            stats,
        }
    }

    /// The aggregator this router feeds.
    #[must_use]
    pub const fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    /// The rendering sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Route one decoded payload. Returns the encoded reply to send, if any.
    pub fn route(&mut self, decoded: &DecodedValue) -> Option<Vec<u8>> {
        match self.try_route(decoded) {
            Ok(Dispatch::Reply(bytes)) => {
                self.stats.record_pong_sent();
                Some(bytes)
            }
            Ok(Dispatch::Tick(_)) => None,
            Ok(Dispatch::Ignored(kind)) => {
                tracing::debug!(message_type = ?kind, "Ignoring unhandled message");
                self.stats.record_frame_dropped(DropReason::Unhandled);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed message");
                self.stats.record_frame_dropped(DropReason::Malformed);
                None
            }
        }
    }

    /// Route one payload, reporting what happened.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] for malformed payloads. No state changes on
    /// error.
    pub fn try_route(&mut self, decoded: &DecodedValue) -> Result<Dispatch, RoutingError> {
        let DecodedValue::Mapping(_) = decoded else {
            return Err(RoutingError::NotAMapping(decoded.kind()));
        };

        match decoded.get("type").and_then(DecodedValue::as_str) {
            Some(MARKET_DATA_TYPE) => {
                let data = decoded
                    .get("data")
                    .ok_or(RoutingError::MissingField("data"))?;
                let tick = parse_tick(data)?;
                let display = TickDisplay::from_tick(&tick)
                    .ok_or_else(|| invalid("ts", "outside the representable date range"))?;
                Ok(Dispatch::Tick(self.ingest(&tick, display)))
            }
            Some(PING_TYPE) => {
                let bytes = self.codec.encode(&pong_message())?;
                tracing::trace!("Answering ping");
                Ok(Dispatch::Reply(bytes))
            }
            other => Ok(Dispatch::Ignored(other.map(str::to_string))),
        }
    }

    fn ingest(&mut self, tick: &MarketTick, display: TickDisplay) -> IngestOutcome {
        let outcome = self.aggregator.ingest(tick);

        if let Some(finalized) = outcome.finalized.as_ref() {
            tracing::info!(
                symbol = %tick.symbol,
                bucket_start = finalized.bucket_start,
                open = finalized.open,
                high = finalized.high,
                low = finalized.low,
                close = finalized.close,
                volume = finalized.volume,
                "Candle finalized"
            );
            self.stats.record_candle_finalized();
            self.sink.on_candle_finalized(finalized);
        }

        self.sink.on_tick(&TickUpdate {
            candle: outcome.current,
            display,
        });
        outcome
    }

    fn decode_frame(&self, frame: &Frame) -> Option<DecodedValue> {
        match frame {
            Frame::Binary(bytes) => match self.codec.decode(bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable frame");
                    self.stats.record_frame_dropped(DropReason::Decode);
                    None
                }
            },
            Frame::Text(text) => match self.json.decode(text) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, len = text.len(), "Dropping unparseable text frame");
                    self.stats.record_frame_dropped(DropReason::Json);
                    None
                }
            },
        }
    }
}

impl<S: RenderSink> FrameHandler for MessageRouter<S> {
    fn on_frame(&mut self, frame: Frame) -> Option<Frame> {
        let started = Instant::now();
        let kind = frame.kind();
        self.stats.record_frame_received(kind);

        let reply = self
            .decode_frame(&frame)
            .and_then(|value| self.route(&value))
            .map(Frame::Binary);

        record_processing_duration(kind, started.elapsed());
        reply
    }
}

// =============================================================================
// Tick Parsing
// =============================================================================

/// Extract a tick from a `market_data` payload's `data` mapping.
///
/// # Errors
///
/// Returns [`RoutingError`] if a field is missing or has the wrong type.
pub fn parse_tick(data: &DecodedValue) -> Result<MarketTick, RoutingError> {
    let DecodedValue::Mapping(_) = data else {
        return Err(RoutingError::NotAMapping(data.kind()));
    };

    let symbol = data
        .get("symbol")
        .ok_or(RoutingError::MissingField("symbol"))?
        .as_str()
        .ok_or_else(|| invalid("symbol", "expected text"))?
        .to_string();

    Ok(MarketTick {
        symbol,
        price: number_field(data, "price")?,
        volume_24h: number_field(data, "volume_24h")?,
        timestamp_secs: timestamp_field(data, "ts")?,
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> RoutingError {
    RoutingError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn number_field(data: &DecodedValue, field: &'static str) -> Result<f64, RoutingError> {
    let value = data.get(field).ok_or(RoutingError::MissingField(field))?;
    let number = match value {
        DecodedValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| invalid(field, e.to_string()))?,
        other => other
            .as_f64()
            .ok_or_else(|| invalid(field, format!("expected number, got {}", other.kind())))?,
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(invalid(field, "not finite"))
    }
}

/// Offset-less ISO 8601 forms, read as UTC.
const NAIVE_ISO_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Millisecond epoch (integer, float, or numeric text) or ISO 8601 text,
/// floored to whole seconds. Rejects instants `chrono` cannot represent.
fn timestamp_field(data: &DecodedValue, field: &'static str) -> Result<i64, RoutingError> {
    let value = data.get(field).ok_or(RoutingError::MissingField(field))?;
    let secs = match value {
        DecodedValue::Integer(ms) => ms.div_euclid(1_000),
        DecodedValue::Float(ms) => {
            millis_f64_to_secs(*ms).ok_or_else(|| invalid(field, "out of range"))?
        }
        DecodedValue::Text(text) => {
            text_timestamp(text.trim()).map_err(|e| invalid(field, e.to_string()))?
        }
        other => {
            return Err(invalid(
                field,
                format!("expected timestamp, got {}", other.kind()),
            ));
        }
    };

    if DateTime::<Utc>::from_timestamp(secs, 0).is_none() {
        return Err(invalid(field, "outside the representable date range"));
    }
    Ok(secs)
}

fn text_timestamp(text: &str) -> Result<i64, chrono::ParseError> {
    if let Ok(ms) = text.parse::<i64>() {
        return Ok(ms.div_euclid(1_000));
    }

    let rfc3339 = DateTime::parse_from_rfc3339(text).map(|dt| dt.timestamp());
    NAIVE_ISO_FORMATS.iter().fold(rfc3339, |parsed, format| {
        parsed.or_else(|_| {
            NaiveDateTime::parse_from_str(text, format).map(|dt| dt.and_utc().timestamp())
        })
    })
}

#[allow(clippy::cast_possible_truncation)]
fn millis_f64_to_secs(ms: f64) -> Option<i64> {
    let secs = (ms / 1_000.0).floor();
    // i64::MAX as f64 rounds up, so the upper bound is exclusive.
    #[allow(clippy::cast_precision_loss)]
    let in_range = secs.is_finite() && secs >= i64::MIN as f64 && secs < i64::MAX as f64;
    in_range.then_some(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockRenderSink;
    use crate::domain::market::Candle;
    use crate::infrastructure::codec::{DecodeOptions, EncodeMode, decode, encode};
    use test_case::test_case;

    fn market_data(ts: impl Into<DecodedValue>, price: impl Into<DecodedValue>) -> DecodedValue {
        DecodedValue::mapping([
            ("type", DecodedValue::from("market_data")),
            (
                "data",
                DecodedValue::mapping([
                    ("ts", ts.into()),
                    ("price", price.into()),
                    ("volume_24h", DecodedValue::Float(1_234_567.0)),
                    ("symbol", DecodedValue::from("BTC")),
                ]),
            ),
        ])
    }

    fn router<S: RenderSink>(sink: S) -> MessageRouter<S> {
        MessageRouter::new(
            MsgPackCodec::new(),
            CandleAggregator::new(60, 10).unwrap(),
            sink,
            Arc::new(StreamStats::new()),
        )
    }

    #[derive(Default)]
    struct RecordingSink {
        ticks: Vec<TickUpdate>,
        finalized: Vec<Candle>,
    }

    impl RenderSink for RecordingSink {
        fn on_tick(&mut self, update: &TickUpdate) {
            self.ticks.push(update.clone());
        }

        fn on_candle_finalized(&mut self, candle: &Candle) {
            self.finalized.push(*candle);
        }
    }

    #[test]
    fn market_data_reaches_sink() {
        let mut sink = MockRenderSink::new();
        sink.expect_on_tick()
            .withf(|update| {
                update.candle.bucket_start == 1_699_999_980
                    && update.display.symbol == "BTC"
                    && update.display.volume_24h_formatted == "1.23M"
            })
            .times(1)
            .return_const(());
        sink.expect_on_candle_finalized().never();

        let mut router = router(sink);
        assert!(router.route(&market_data(1_700_000_000_123_i64, 64_250.5)).is_none());
    }

    #[test]
    fn finalized_candle_is_forwarded() {
        let mut router = router(RecordingSink::default());
        router.route(&market_data(0_i64, 100.0));
        router.route(&market_data(30_000_i64, 105.0));
        router.route(&market_data(61_000_i64, 102.0));

        let sink = router.sink();
        assert_eq!(sink.ticks.len(), 3);
        assert_eq!(sink.finalized.len(), 1);
        assert_eq!(sink.finalized[0].bucket_start, 0);
        assert_eq!(sink.finalized[0].high, 105.0);
        assert_eq!(sink.ticks[2].candle.bucket_start, 60);
        assert_eq!(router.aggregator().history().len(), 1);
    }

    #[test]
    fn ping_produces_compact_pong() {
        let mut router = router(RecordingSink::default());
        let reply = router
            .route(&DecodedValue::mapping([("type", "ping")]))
            .unwrap();

        assert_eq!(reply, vec![0x81, 0xa4, b't', b'y', b'p', b'e', 0xa4, b'p', b'o', b'n', b'g']);
        assert!(router.sink().ticks.is_empty());
    }

    #[test]
    fn ping_frame_replies_with_binary_frame() {
        let mut router = router(RecordingSink::default());
        let ping = encode(&DecodedValue::mapping([("type", "ping")]), EncodeMode::Compact).unwrap();

        let reply = router.on_frame(Frame::Binary(ping)).unwrap();
        let Frame::Binary(bytes) = reply else {
            panic!("expected binary pong");
        };
        assert_eq!(
            decode(&bytes, DecodeOptions::strict()).unwrap(),
            DecodedValue::mapping([("type", "pong")])
        );
    }

    #[test]
    fn text_frame_market_data() {
        let mut router = router(RecordingSink::default());
        let text = r#"{"type":"market_data","data":{"ts":"2023-11-14T22:13:20Z","price":"100.5","volume_24h":"2500","symbol":"ETH"}}"#;

        assert!(router.on_frame(Frame::Text(text.to_string())).is_none());
        let tick = &router.sink().ticks[0];
        assert_eq!(tick.display.symbol, "ETH");
        assert_eq!(tick.display.price, 100.5);
        assert_eq!(tick.display.volume_24h_formatted, "2.50K");
        assert_eq!(tick.display.last_update.timestamp(), 1_700_000_000);
    }

    #[test]
    fn undecodable_frames_are_dropped() {
        let stats = Arc::new(StreamStats::new());
        let mut router = MessageRouter::new(
            MsgPackCodec::new(),
            CandleAggregator::new(60, 10).unwrap(),
            RecordingSink::default(),
            Arc::clone(&stats),
        );

        assert!(router.on_frame(Frame::Binary(vec![0xc1])).is_none());
        assert!(router.on_frame(Frame::Text("{".to_string())).is_none());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_dropped, 2);
        assert!(router.sink().ticks.is_empty());
    }

    #[test]
    fn unknown_type_is_ignored() {
        let mut router = router(RecordingSink::default());
        let dispatch = router
            .try_route(&DecodedValue::mapping([("type", "heartbeat")]))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Ignored(Some("heartbeat".to_string())));

        let dispatch = router
            .try_route(&DecodedValue::mapping([("kind", "x")]))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Ignored(None));
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let mut router = router(RecordingSink::default());
        router.route(&market_data(0_i64, 100.0));

        let bad = market_data(0_i64, true);
        assert!(matches!(
            router.try_route(&bad),
            Err(RoutingError::InvalidField { field: "price", .. })
        ));
        assert!(router.route(&bad).is_none());
        assert_eq!(router.aggregator().current().map(|c| c.close), Some(100.0));
        assert_eq!(router.sink().ticks.len(), 1);
    }

    #[test]
    fn non_mapping_payload_is_rejected() {
        let mut router = router(RecordingSink::default());
        assert_eq!(
            router.try_route(&DecodedValue::Integer(1)),
            Err(RoutingError::NotAMapping("integer"))
        );
    }

    #[test_case(DecodedValue::Integer(1_700_000_000_999), 1_700_000_000 ; "integer millis")]
    #[test_case(DecodedValue::Integer(-1), -1 ; "negative millis floor")]
    #[test_case(DecodedValue::Float(61_500.0), 61 ; "float millis")]
    #[test_case(DecodedValue::from("1700000000123"), 1_700_000_000 ; "numeric text")]
    #[test_case(DecodedValue::from("2023-11-14T22:13:20.500+00:00"), 1_700_000_000 ; "rfc3339")]
    #[test_case(DecodedValue::from("2023-11-14T22:13:20"), 1_700_000_000 ; "naive iso")]
    #[test_case(DecodedValue::from("2023-11-14T22:13:20.123456"), 1_700_000_000 ; "naive iso micros")]
    #[test_case(DecodedValue::from("2023-11-14 22:13:20"), 1_700_000_000 ; "naive iso space")]
    fn timestamp_forms(ts: DecodedValue, expected: i64) {
        let data = DecodedValue::mapping([
            ("ts", ts),
            ("price", DecodedValue::Integer(1)),
            ("volume_24h", DecodedValue::Integer(0)),
            ("symbol", DecodedValue::from("BTC")),
        ]);
        assert_eq!(parse_tick(&data).unwrap().timestamp_secs, expected);
    }

    #[test_case("symbol" ; "symbol")]
    #[test_case("price" ; "price")]
    #[test_case("volume_24h" ; "volume")]
    #[test_case("ts" ; "timestamp")]
    fn missing_field(field: &'static str) {
        let pairs: Vec<(&str, DecodedValue)> = vec![
            ("ts", DecodedValue::Integer(0)),
            ("price", DecodedValue::Integer(1)),
            ("volume_24h", DecodedValue::Integer(0)),
            ("symbol", DecodedValue::from("BTC")),
        ]
        .into_iter()
        .filter(|(k, _)| *k != field)
        .collect();

        assert_eq!(
            parse_tick(&DecodedValue::mapping(pairs)),
            Err(RoutingError::MissingField(field))
        );
    }

    #[test_case(DecodedValue::Float(-9.223_372_036_854_775_808e21) ; "float at i64 min seconds")]
    #[test_case(DecodedValue::Float(9.0e18) ; "float beyond date range")]
    #[test_case(DecodedValue::Integer(i64::MIN) ; "integer min")]
    #[test_case(DecodedValue::from("-9223372036854775808") ; "numeric text min")]
    fn unrepresentable_timestamps_are_rejected(ts: DecodedValue) {
        let data = DecodedValue::mapping([
            ("ts", ts),
            ("price", DecodedValue::Integer(1)),
            ("volume_24h", DecodedValue::Integer(0)),
            ("symbol", DecodedValue::from("BTC")),
        ]);
        assert!(matches!(
            parse_tick(&data),
            Err(RoutingError::InvalidField { field: "ts", .. })
        ));
    }

    #[test_case(Frame::Text(r#"{"type":"market_data","data":{"ts":-9.223372036854775808e21,"price":1,"volume_24h":0,"symbol":"BTC"}}"#.to_string()) ; "json")]
    #[test_case(Frame::Binary(extreme_ts_msgpack()) ; "msgpack")]
    fn extreme_timestamp_frame_is_dropped(frame: Frame) {
        let stats = Arc::new(StreamStats::new());
        let mut router = MessageRouter::new(
            MsgPackCodec::new(),
            CandleAggregator::new(60, 10).unwrap(),
            RecordingSink::default(),
            Arc::clone(&stats),
        );

        assert!(router.on_frame(frame).is_none());
        assert!(router.aggregator().current().is_none());
        assert!(router.sink().ticks.is_empty());
        assert_eq!(stats.snapshot().frames_dropped, 1);
    }

    fn extreme_ts_msgpack() -> Vec<u8> {
        let value = DecodedValue::mapping([
            ("type", DecodedValue::from("market_data")),
            (
                "data",
                DecodedValue::mapping([
                    ("ts", DecodedValue::Float(-9.223_372_036_854_775_808e21)),
                    ("price", DecodedValue::Integer(1)),
                    ("volume_24h", DecodedValue::Integer(0)),
                    ("symbol", DecodedValue::from("BTC")),
                ]),
            ),
        ]);
        encode(&value, EncodeMode::Extended).unwrap()
    }

    #[test]
    fn bad_timestamp_text() {
        let data = DecodedValue::mapping([
            ("ts", DecodedValue::from("yesterday")),
            ("price", DecodedValue::Integer(1)),
            ("volume_24h", DecodedValue::Integer(0)),
            ("symbol", DecodedValue::from("BTC")),
        ]);
        assert!(matches!(
            parse_tick(&data),
            Err(RoutingError::InvalidField { field: "ts", .. })
        ));
    }
}
