//! Decoded Value Model
//!
//! The tagged value produced by both the binary and the text codec.

/// A decoded wire value.
///
/// Mappings keep every pair in wire order. Keys are not required to be
/// unique; [`DecodedValue::get`] resolves duplicates to the last pair.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// `nil`.
    Nil,
    /// Boolean.
    Bool(bool),
    /// Any integer tag, widened to `i64`.
    Integer(i64),
    /// IEEE 754 double.
    Float(f64),
    /// UTF-8 string.
    Text(String),
    /// Ordered list of values.
    Sequence(Vec<DecodedValue>),
    /// Ordered list of key/value pairs.
    Mapping(Vec<(DecodedValue, DecodedValue)>),
}

impl DecodedValue {
    /// Build a mapping with text keys, preserving the given order.
    #[must_use]
    pub fn mapping<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Mapping(
            pairs
                .into_iter()
                .map(|(k, v)| (Self::Text(k.into()), v.into()))
                .collect(),
        )
    }

    /// Look up a text key in a mapping. Last write wins on duplicate keys.
    ///
    /// Returns `None` for non-mapping values.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Mapping(pairs) => pairs
                .iter()
                .rev()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Borrow the string if this is `Text`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is `Integer`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of an `Integer` or `Float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether this is `Nil`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Short name of the variant, used in error messages and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }
}

impl From<bool> for DecodedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DecodedValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for DecodedValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DecodedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DecodedValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Self>> for DecodedValue {
    fn from(value: Vec<Self>) -> Self {
        Self::Sequence(value)
    }
}
