//! Codec Conformance Tests
//!
//! Checks the `MessagePack` subset codec against `rmpv`, an independent
//! implementation of the full format.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use proptest::prelude::*;
use rmpv::Value;

use candle_stream::infrastructure::codec::{
    DecodeError, DecodeOptions, DecodedValue, EncodeMode, MsgPackCodec, decode, encode,
    subscribe_message,
};

fn write(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).unwrap();
    buf
}

fn read(bytes: &[u8]) -> Value {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor).unwrap();
    assert!(cursor.is_empty(), "trailing bytes after rmpv read");
    value
}

fn from_rmpv(value: &Value) -> DecodedValue {
    match value {
        Value::Nil => DecodedValue::Nil,
        Value::Boolean(b) => DecodedValue::Bool(*b),
        Value::Integer(n) => DecodedValue::Integer(n.as_i64().unwrap()),
        Value::F64(f) => DecodedValue::Float(*f),
        Value::String(s) => DecodedValue::Text(s.as_str().unwrap().to_string()),
        Value::Array(items) => DecodedValue::Sequence(items.iter().map(from_rmpv).collect()),
        Value::Map(pairs) => DecodedValue::Mapping(
            pairs
                .iter()
                .map(|(k, v)| (from_rmpv(k), from_rmpv(v)))
                .collect(),
        ),
        other => panic!("outside the supported subset: {other:?}"),
    }
}

#[test]
fn test_decodes_realistic_server_message() {
    let message = Value::Map(vec![
        (Value::from("type"), Value::from("market_data")),
        (
            Value::from("data"),
            Value::Map(vec![
                (Value::from("ts"), Value::F64(1_700_000_000_123.0)),
                (Value::from("price"), Value::F64(64_250.5)),
                (Value::from("volume_24h"), Value::F64(1.25e9)),
                (Value::from("symbol"), Value::from("BTC")),
                (Value::from("seq"), Value::from(70_000)),
                (Value::from("delta"), Value::from(-40_000)),
                (Value::from("flags"), Value::Array(vec![Value::Nil, Value::from(true)])),
            ]),
        ),
    ]);

    let decoded = MsgPackCodec::new().decode(&write(&message)).unwrap();
    assert_eq!(decoded, from_rmpv(&message));

    let data = decoded.get("data").unwrap();
    assert_eq!(data.get("price").and_then(DecodedValue::as_f64), Some(64_250.5));
    assert_eq!(data.get("delta").and_then(DecodedValue::as_i64), Some(-40_000));
}

#[test]
fn test_long_text_and_collections_use_wide_tags() {
    let long = "x".repeat(300);
    let items: Vec<Value> = (0..20).map(Value::from).collect();
    let pairs: Vec<(Value, Value)> = (0..20)
        .map(|i| (Value::from(format!("k{i}")), Value::from(i)))
        .collect();
    let message = Value::Array(vec![
        Value::from(long.as_str()),
        Value::Array(items),
        Value::Map(pairs),
    ]);

    let bytes = write(&message);
    assert_eq!(bytes[0], 0x93);
    assert_eq!(bytes[1], 0xda, "rmpv should pick str16 for 300 bytes");

    let decoded = decode(&bytes, DecodeOptions::strict()).unwrap();
    assert_eq!(decoded, from_rmpv(&message));
}

#[test]
fn test_rejects_tags_outside_subset() {
    // Millisecond timestamps as integers need uint64.
    let bytes = write(&Value::from(1_700_000_000_123_u64));
    assert_eq!(bytes[0], 0xcf);
    assert_eq!(
        decode(&bytes, DecodeOptions::strict()),
        Err(DecodeError::UnknownTag {
            tag: 0xcf,
            offset: 0
        })
    );

    let bytes = write(&Value::Binary(vec![1, 2, 3]));
    assert!(matches!(
        decode(&bytes, DecodeOptions::strict()),
        Err(DecodeError::UnknownTag { tag: 0xc4, .. })
    ));
}

#[test]
fn test_lenient_mode_keeps_surrounding_values() {
    let message = Value::Map(vec![
        (Value::from("type"), Value::from("market_data")),
        (Value::from("raw"), Value::Binary(vec![9])),
    ]);
    let bytes = write(&message);

    assert!(decode(&bytes, DecodeOptions::strict()).is_err());
    let decoded = decode(&bytes, DecodeOptions::lenient()).unwrap();
    assert_eq!(decoded.get("type").and_then(DecodedValue::as_str), Some("market_data"));
}

#[test]
fn test_subscription_frame_reads_back_in_rmpv() {
    let bytes = MsgPackCodec::new()
        .encode(&subscribe_message("market.data@BTC"))
        .unwrap();

    assert_eq!(
        read(&bytes),
        Value::Map(vec![
            (Value::from("action"), Value::from("subscribe")),
            (Value::from("topic"), Value::from("market.data@BTC")),
        ])
    );
}

#[test]
fn test_compact_integer_boundaries_read_back_in_rmpv() {
    for n in [-32_i64, -1, 0, 127, 128, 255, 256, 65_535] {
        let bytes = encode(&DecodedValue::Integer(n), EncodeMode::Compact).unwrap();
        assert_eq!(read(&bytes).as_i64(), Some(n), "integer {n}");
    }
}

fn extended_value() -> impl Strategy<Value = DecodedValue> {
    let leaf = prop_oneof![
        Just(DecodedValue::Nil),
        any::<bool>().prop_map(DecodedValue::Bool),
        (i64::from(i32::MIN)..=i64::from(u32::MAX)).prop_map(DecodedValue::Integer),
        (-1.0e15..1.0e15_f64).prop_map(DecodedValue::Float),
        ".{0,40}".prop_map(DecodedValue::Text),
    ];
    leaf.prop_recursive(3, 48, 20, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..20).prop_map(DecodedValue::Sequence),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..20).prop_map(|pairs| {
                DecodedValue::Mapping(
                    pairs
                        .into_iter()
                        .map(|(k, v)| (DecodedValue::Text(k), v))
                        .collect(),
                )
            }),
        ]
    })
}

proptest! {
    #[test]
    fn extended_encoding_matches_rmpv(value in extended_value()) {
        let bytes = encode(&value, EncodeMode::Extended).unwrap();
        prop_assert_eq!(from_rmpv(&read(&bytes)), value.clone());
        prop_assert_eq!(decode(&write(&read(&bytes)), DecodeOptions::strict()).unwrap(), value);
    }
}
