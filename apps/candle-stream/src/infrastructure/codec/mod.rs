//! Stream Codec Module
//!
//! Provides encoding and decoding for the market data stream.
//!
//! - **Binary frames**: a strict `MessagePack` subset ([`MsgPackCodec`])
//! - **Text frames**: JSON fallback ([`JsonCodec`]) into the same value model
//!
//! # Supported `MessagePack` Subset
//!
//! ```text
//! 0x00-0x7f  positive fixint     0xcb  float64
//! 0x80-0x8f  fixmap              0xcc/0xcd/0xce  uint8/16/32
//! 0x90-0x9f  fixarray            0xd0/0xd1/0xd2  int8/16/32
//! 0xa0-0xbf  fixstr              0xd9/0xda  str8/str16
//! 0xc0 nil, 0xc2 false, 0xc3 true  0xdc array16, 0xde map16
//! 0xe0-0xff  negative fixint
//! ```

mod decode;
mod encode;
mod format;
mod value;

pub use decode::{Cursor, DEFAULT_MAX_DEPTH, DecodeError, DecodeOptions, decode, decode_value};
pub use encode::{EncodeMode, UnsupportedValueError, encode};
pub use value::DecodedValue;

/// Subscription request `{action: "subscribe", topic}`.
#[must_use]
pub fn subscribe_message(topic: &str) -> DecodedValue {
    DecodedValue::mapping([("action", "subscribe"), ("topic", topic)])
}

/// Keepalive reply `{type: "pong"}`.
#[must_use]
pub fn pong_message() -> DecodedValue {
    DecodedValue::mapping([("type", "pong")])
}

/// Text frame decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum JsonDecodeError {
    /// Text is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Binary codec bound to a decode policy and an encode mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec {
    decode_options: DecodeOptions,
    encode_mode: EncodeMode,
}

impl MsgPackCodec {
    /// Strict decoding, compact encoding.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            decode_options: DecodeOptions::strict(),
            encode_mode: EncodeMode::Compact,
        }
    }

    /// Create a codec with explicit policies.
    #[must_use]
    pub const fn with_options(decode_options: DecodeOptions, encode_mode: EncodeMode) -> Self {
        Self {
            decode_options,
            encode_mode,
        }
    }

    /// Active decode policy.
    #[must_use]
    pub const fn decode_options(&self) -> DecodeOptions {
        self.decode_options
    }

    /// Active encode mode.
    #[must_use]
    pub const fn encode_mode(&self) -> EncodeMode {
        self.encode_mode
    }

    /// Decode one binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed input, subject to the
    /// configured lenient flag.
    pub fn decode(&self, data: &[u8]) -> Result<DecodedValue, DecodeError> {
        decode(data, self.decode_options)
    }

    /// Encode a value into a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedValueError`] if the value is outside the subset
    /// of the configured mode.
    pub fn encode(&self, value: &DecodedValue) -> Result<Vec<u8>, UnsupportedValueError> {
        encode(value, self.encode_mode)
    }
}

/// JSON codec for text frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parse a text frame into the shared value model.
    ///
    /// Integers that fit `i64` become `Integer`; every other number becomes
    /// `Float`. Object member order follows `serde_json`'s map ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON.
    pub fn decode(&self, text: &str) -> Result<DecodedValue, JsonDecodeError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;
        Ok(from_json(value))
    }
}

fn from_json(value: serde_json::Value) -> DecodedValue {
    match value {
        serde_json::Value::Null => DecodedValue::Nil,
        serde_json::Value::Bool(b) => DecodedValue::Bool(b),
        serde_json::Value::Number(n) => n.as_i64().map_or_else(
            || DecodedValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            DecodedValue::Integer,
        ),
        serde_json::Value::String(s) => DecodedValue::Text(s),
        serde_json::Value::Array(items) => {
            DecodedValue::Sequence(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => DecodedValue::Mapping(
            map.into_iter()
                .map(|(k, v)| (DecodedValue::Text(k), from_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_codec_decode_market_data() {
        let codec = JsonCodec::new();
        let text = r#"{"type":"market_data","data":{"ts":1700000000123,"price":"64250.5","volume_24h":1234.5,"symbol":"BTC"}}"#;

        let value = codec.decode(text).unwrap();
        let data = value.get("data").unwrap();
        assert_eq!(value.get("type").and_then(DecodedValue::as_str), Some("market_data"));
        assert_eq!(data.get("ts"), Some(&DecodedValue::Integer(1_700_000_000_123)));
        assert_eq!(data.get("price"), Some(&DecodedValue::from("64250.5")));
        assert_eq!(data.get("volume_24h"), Some(&DecodedValue::Float(1234.5)));
    }

    #[test]
    fn json_codec_numbers_beyond_i64_become_float() {
        let value = JsonCodec::new().decode("[18446744073709551615, -1, null]").unwrap();
        assert_eq!(
            value,
            DecodedValue::Sequence(vec![
                DecodedValue::Float(18_446_744_073_709_551_615.0),
                DecodedValue::Integer(-1),
                DecodedValue::Nil,
            ])
        );
    }

    #[test]
    fn json_codec_rejects_garbage() {
        assert!(JsonCodec::new().decode("not json").is_err());
    }

    #[test]
    fn msgpack_codec_defaults_are_strict_and_compact() {
        let codec = MsgPackCodec::new();
        assert!(!codec.decode_options().lenient);
        assert_eq!(codec.encode_mode(), EncodeMode::Compact);
        assert!(codec.decode(&[0xc1]).is_err());
        assert!(codec.encode(&DecodedValue::Float(1.0)).is_err());
    }

    #[test]
    fn msgpack_codec_respects_options() {
        let codec = MsgPackCodec::with_options(DecodeOptions::lenient(), EncodeMode::Extended);
        assert_eq!(codec.decode(&[0xc1]).unwrap(), DecodedValue::Nil);
        let bytes = codec.encode(&DecodedValue::Float(1.0)).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), DecodedValue::Float(1.0));
    }

    #[test]
    fn subscribe_message_shape() {
        let msg = subscribe_message("market.data@BTC");
        assert_eq!(msg.get("action").and_then(DecodedValue::as_str), Some("subscribe"));
        assert_eq!(msg.get("topic").and_then(DecodedValue::as_str), Some("market.data@BTC"));
    }

    #[test]
    fn msgpack_codec_pong_round_trip() {
        let codec = MsgPackCodec::new();
        let pong = pong_message();

        let bytes = codec.encode(&pong).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), pong);
    }
}
