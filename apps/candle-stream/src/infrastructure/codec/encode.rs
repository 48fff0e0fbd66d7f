//! Binary Encoder
//!
//! Compact mode covers only what the client itself sends (small maps of
//! short strings and small integers). Extended mode mirrors every tag the
//! decoder understands. Neither mode ever emits a partial buffer: a value
//! that cannot be represented fails the whole encode.

use super::format as tag;
use super::value::DecodedValue;

/// Largest text, sequence, or mapping length expressible with a 16-bit prefix.
const LEN16_MAX: usize = u16::MAX as usize;

/// Largest text length in compact mode (str8).
const COMPACT_TEXT_MAX: usize = u8::MAX as usize;

/// A value outside the encoder's representable subset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnsupportedValueError {
    /// Floats are only encodable in extended mode.
    #[error("float {0} is not representable in compact mode")]
    Float(f64),

    /// Integer outside the representable range.
    #[error("integer {value} outside representable range [{min}, {max}]")]
    IntegerOutOfRange {
        /// The rejected value.
        value: i64,
        /// Smallest representable integer in the active mode.
        min: i64,
        /// Largest representable integer in the active mode.
        max: i64,
    },

    /// Text longer than the mode allows.
    #[error("text of {len} bytes exceeds limit of {max}")]
    TextTooLong {
        /// UTF-8 length of the text.
        len: usize,
        /// Mode limit.
        max: usize,
    },

    /// Sequence longer than the mode allows.
    #[error("sequence of {len} elements exceeds limit of {max}")]
    SequenceTooLong {
        /// Element count.
        len: usize,
        /// Mode limit.
        max: usize,
    },

    /// Mapping larger than the mode allows.
    #[error("mapping of {len} entries exceeds limit of {max}")]
    MappingTooLarge {
        /// Entry count.
        len: usize,
        /// Mode limit.
        max: usize,
    },
}

/// Which tags the encoder may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeMode {
    /// nil, bool, integers in [-32, 65535], text up to 255 bytes,
    /// fixarray and fixmap only.
    #[default]
    Compact,
    /// Everything the decoder accepts: adds int8/16/32, uint32, float64,
    /// str16, array16, map16.
    Extended,
}

impl EncodeMode {
    const fn integer_range(self) -> (i64, i64) {
        match self {
            Self::Compact => (-32, u16::MAX as i64),
            Self::Extended => (i32::MIN as i64, u32::MAX as i64),
        }
    }

    const fn text_max(self) -> usize {
        match self {
            Self::Compact => COMPACT_TEXT_MAX,
            Self::Extended => LEN16_MAX,
        }
    }

    const fn collection_max(self) -> usize {
        match self {
            Self::Compact => tag::FIXCOLLECTION_LEN_MAX,
            Self::Extended => LEN16_MAX,
        }
    }
}

/// Encode `value` into a fresh buffer.
///
/// # Errors
///
/// Returns [`UnsupportedValueError`] if any part of `value` is outside the
/// subset allowed by `mode`.
pub fn encode(value: &DecodedValue, mode: EncodeMode) -> Result<Vec<u8>, UnsupportedValueError> {
    let mut out = Vec::new();
    write_value(&mut out, value, mode)?;
    Ok(out)
}

fn write_value(
    out: &mut Vec<u8>,
    value: &DecodedValue,
    mode: EncodeMode,
) -> Result<(), UnsupportedValueError> {
    match value {
        DecodedValue::Nil => out.push(tag::NIL),
        DecodedValue::Bool(false) => out.push(tag::FALSE),
        DecodedValue::Bool(true) => out.push(tag::TRUE),
        DecodedValue::Integer(n) => write_integer(out, *n, mode)?,
        DecodedValue::Float(f) => match mode {
            EncodeMode::Compact => return Err(UnsupportedValueError::Float(*f)),
            EncodeMode::Extended => {
                out.push(tag::FLOAT64);
                out.extend_from_slice(&f.to_be_bytes());
            }
        },
        DecodedValue::Text(s) => write_text(out, s, mode)?,
        DecodedValue::Sequence(items) => {
            write_collection_header(out, items.len(), tag::FIXARRAY, tag::ARRAY16, mode)
                .map_err(|max| UnsupportedValueError::SequenceTooLong {
                    len: items.len(),
                    max,
                })?;
            for item in items {
                write_value(out, item, mode)?;
            }
        }
        DecodedValue::Mapping(pairs) => {
            write_collection_header(out, pairs.len(), tag::FIXMAP, tag::MAP16, mode).map_err(
                |max| UnsupportedValueError::MappingTooLarge {
                    len: pairs.len(),
                    max,
                },
            )?;
            for (key, value) in pairs {
                write_value(out, key, mode)?;
                write_value(out, value, mode)?;
            }
        }
    }
    Ok(())
}

fn write_integer(out: &mut Vec<u8>, n: i64, mode: EncodeMode) -> Result<(), UnsupportedValueError> {
    let (min, max) = mode.integer_range();
    if n < min || n > max {
        return Err(UnsupportedValueError::IntegerOutOfRange { value: n, min, max });
    }

    if let Ok(small) = u8::try_from(n)
        && small <= tag::POSITIVE_FIXINT_MAX
    {
        out.push(small);
    } else if (-32..0).contains(&n) {
        out.extend_from_slice(&i8::try_from(n).unwrap_or_default().to_be_bytes());
    } else if let Ok(v) = u8::try_from(n) {
        out.push(tag::UINT8);
        out.push(v);
    } else if let Ok(v) = u16::try_from(n) {
        out.push(tag::UINT16);
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = u32::try_from(n) {
        out.push(tag::UINT32);
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i8::try_from(n) {
        out.push(tag::INT8);
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i16::try_from(n) {
        out.push(tag::INT16);
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i32::try_from(n) {
        out.push(tag::INT32);
        out.extend_from_slice(&v.to_be_bytes());
    }
    Ok(())
}

fn write_text(out: &mut Vec<u8>, s: &str, mode: EncodeMode) -> Result<(), UnsupportedValueError> {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let max = mode.text_max();
    if len > max {
        return Err(UnsupportedValueError::TextTooLong { len, max });
    }

    if len <= tag::FIXSTR_LEN_MAX {
        // len fits in the low five bits.
        out.push(tag::FIXSTR | u8::try_from(len).unwrap_or_default());
    } else if let Ok(short) = u8::try_from(len) {
        out.push(tag::STR8);
        out.push(short);
    } else if let Ok(long) = u16::try_from(len) {
        out.push(tag::STR16);
        out.extend_from_slice(&long.to_be_bytes());
    }
    out.extend_from_slice(bytes);
    Ok(())
}

/// Writes the header, or returns the mode's limit if `len` exceeds it.
fn write_collection_header(
    out: &mut Vec<u8>,
    len: usize,
    fix_tag: u8,
    tag16: u8,
    mode: EncodeMode,
) -> Result<(), usize> {
    let max = mode.collection_max();
    if len > max {
        return Err(max);
    }

    if len <= tag::FIXCOLLECTION_LEN_MAX {
        out.push(fix_tag | u8::try_from(len).unwrap_or_default());
    } else if let Ok(long) = u16::try_from(len) {
        out.push(tag16);
        out.extend_from_slice(&long.to_be_bytes());
    }
    Ok(())
}
