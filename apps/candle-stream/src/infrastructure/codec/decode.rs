//! Binary Decoder
//!
//! Recursive descent over an explicit [`Cursor`]. Each call consumes exactly
//! the bytes its tag declares; there is no lookahead and no backtracking.

use super::format as tag;
use super::value::DecodedValue;

/// Default maximum nesting depth of sequences and mappings.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Decoder errors. Offsets are byte positions in the input buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Tag byte outside the supported subset.
    #[error("unsupported tag 0x{tag:02x} at offset {offset}")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
        /// Offset of the tag byte.
        offset: usize,
    },

    /// Declared length runs past the end of the buffer.
    #[error("truncated input at offset {offset}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Offset where the read started.
        offset: usize,
        /// Bytes the tag declared.
        needed: usize,
        /// Bytes actually left.
        remaining: usize,
    },

    /// String payload is not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string payload.
        offset: usize,
    },

    /// Bytes left over after the top-level value.
    #[error("{remaining} trailing bytes after value ending at offset {offset}")]
    TrailingBytes {
        /// Offset of the first trailing byte.
        offset: usize,
        /// Number of trailing bytes.
        remaining: usize,
    },

    /// Nesting exceeds the configured limit.
    #[error("nesting deeper than {limit} at offset {offset}")]
    DepthLimit {
        /// The configured limit.
        limit: usize,
        /// Offset of the collection tag that crossed it.
        offset: usize,
    },
}

/// How the decoder reacts to malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Replace undecodable values with `Nil` instead of failing.
    pub lenient: bool,
    /// Maximum collection nesting depth.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            lenient: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    /// Strict decoding with the default depth limit.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            lenient: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Lenient decoding with the default depth limit.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            lenient: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Forward-only read position over a byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] without moving if fewer than `n`
    /// bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Consume exactly `N` bytes into an array.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if fewer than `N` bytes remain.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn skip_to_end(&mut self) {
        self.pos = self.buf.len();
    }
}

/// Decode one complete value from `buf`.
///
/// # Errors
///
/// In strict mode any malformed input is an error. In lenient mode only
/// [`DecodeError::DepthLimit`] is reported; other failures decode as `Nil`.
pub fn decode(buf: &[u8], options: DecodeOptions) -> Result<DecodedValue, DecodeError> {
    let mut cursor = Cursor::new(buf);
    let value = decode_value(&mut cursor, options, 0)?;

    if cursor.remaining() > 0 {
        let err = DecodeError::TrailingBytes {
            offset: cursor.position(),
            remaining: cursor.remaining(),
        };
        if !options.lenient {
            return Err(err);
        }
        tracing::debug!(error = %err, "Ignoring trailing bytes");
    }

    Ok(value)
}

/// Decode the value starting at the cursor.
///
/// `depth` is the number of enclosing collections.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_value(
    cursor: &mut Cursor<'_>,
    options: DecodeOptions,
    depth: usize,
) -> Result<DecodedValue, DecodeError> {
    let start = cursor.position();
    match decode_tagged(cursor, options, depth) {
        Ok(value) => Ok(value),
        Err(err @ DecodeError::DepthLimit { .. }) => Err(err),
        Err(err) if options.lenient => {
            tracing::warn!(error = %err, offset = start, "Substituting nil for undecodable value");
            match err {
                DecodeError::UnknownTag { offset, .. } => {
                    // Resume right after the unknown tag byte.
                    cursor.pos = offset + 1;
                }
                DecodeError::Truncated { .. } => cursor.skip_to_end(),
                _ => {}
            }
            Ok(DecodedValue::Nil)
        }
        Err(err) => Err(err),
    }
}

fn decode_tagged(
    cursor: &mut Cursor<'_>,
    options: DecodeOptions,
    depth: usize,
) -> Result<DecodedValue, DecodeError> {
    let offset = cursor.position();
    let [byte] = cursor.take_array::<1>()?;

    let value = match byte {
        0x00..=tag::POSITIVE_FIXINT_MAX => DecodedValue::Integer(i64::from(byte)),
        tag::NEGATIVE_FIXINT..=0xff => DecodedValue::Integer(i64::from(i8::from_be_bytes([byte]))),
        tag::FIXMAP..=tag::FIXMAP_MAX => {
            let len = usize::from(byte & 0x0f);
            decode_mapping(cursor, options, depth, len, offset)?
        }
        tag::FIXARRAY..=tag::FIXARRAY_MAX => {
            let len = usize::from(byte & 0x0f);
            decode_sequence(cursor, options, depth, len, offset)?
        }
        tag::FIXSTR..=tag::FIXSTR_MAX => {
            let len = usize::from(byte & 0x1f);
            decode_text(cursor, options, len)?
        }
        tag::NIL => DecodedValue::Nil,
        tag::FALSE => DecodedValue::Bool(false),
        tag::TRUE => DecodedValue::Bool(true),
        tag::FLOAT64 => DecodedValue::Float(f64::from_be_bytes(cursor.take_array()?)),
        tag::UINT8 => DecodedValue::Integer(i64::from(u8::from_be_bytes(cursor.take_array()?))),
        tag::UINT16 => DecodedValue::Integer(i64::from(u16::from_be_bytes(cursor.take_array()?))),
        tag::UINT32 => DecodedValue::Integer(i64::from(u32::from_be_bytes(cursor.take_array()?))),
        tag::INT8 => DecodedValue::Integer(i64::from(i8::from_be_bytes(cursor.take_array()?))),
        tag::INT16 => DecodedValue::Integer(i64::from(i16::from_be_bytes(cursor.take_array()?))),
        tag::INT32 => DecodedValue::Integer(i64::from(i32::from_be_bytes(cursor.take_array()?))),
        tag::STR8 => {
            let len = usize::from(u8::from_be_bytes(cursor.take_array()?));
            decode_text(cursor, options, len)?
        }
        tag::STR16 => {
            let len = usize::from(u16::from_be_bytes(cursor.take_array()?));
            decode_text(cursor, options, len)?
        }
        tag::ARRAY16 => {
            let len = usize::from(u16::from_be_bytes(cursor.take_array()?));
            decode_sequence(cursor, options, depth, len, offset)?
        }
        tag::MAP16 => {
            let len = usize::from(u16::from_be_bytes(cursor.take_array()?));
            decode_mapping(cursor, options, depth, len, offset)?
        }
        other => return Err(DecodeError::UnknownTag { tag: other, offset }),
    };

    Ok(value)
}

fn decode_text(
    cursor: &mut Cursor<'_>,
    options: DecodeOptions,
    len: usize,
) -> Result<DecodedValue, DecodeError> {
    let offset = cursor.position();
    let bytes = cursor.take(len)?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(DecodedValue::Text(s.to_string())),
        Err(_) if options.lenient => {
            tracing::warn!(offset, "Replacing invalid UTF-8 in string");
            Ok(DecodedValue::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        Err(_) => Err(DecodeError::InvalidUtf8 { offset }),
    }
}

fn check_depth(options: DecodeOptions, depth: usize, offset: usize) -> Result<(), DecodeError> {
    if depth >= options.max_depth {
        return Err(DecodeError::DepthLimit {
            limit: options.max_depth,
            offset,
        });
    }
    Ok(())
}

fn decode_sequence(
    cursor: &mut Cursor<'_>,
    options: DecodeOptions,
    depth: usize,
    len: usize,
    offset: usize,
) -> Result<DecodedValue, DecodeError> {
    check_depth(options, depth, offset)?;
    // Every element takes at least one byte.
    let mut items = Vec::with_capacity(len.min(cursor.remaining()));
    for _ in 0..len {
        items.push(decode_value(cursor, options, depth + 1)?);
    }
    Ok(DecodedValue::Sequence(items))
}

fn decode_mapping(
    cursor: &mut Cursor<'_>,
    options: DecodeOptions,
    depth: usize,
    len: usize,
    offset: usize,
) -> Result<DecodedValue, DecodeError> {
    check_depth(options, depth, offset)?;
    let mut pairs = Vec::with_capacity(len.min(cursor.remaining() / 2));
    for _ in 0..len {
        let key = decode_value(cursor, options, depth + 1)?;
        let value = decode_value(cursor, options, depth + 1)?;
        pairs.push((key, value));
    }
    Ok(DecodedValue::Mapping(pairs))
}
