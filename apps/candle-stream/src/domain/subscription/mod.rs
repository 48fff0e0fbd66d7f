//! Subscription
//!
//! The topic a session subscribes to on every successful open. Fixed for the
//! lifetime of the session.

/// Default subscription topic.
pub const DEFAULT_TOPIC: &str = "market.data@BTC";

/// Immutable subscription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    topic: String,
}

impl Subscription {
    /// Subscribe to `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC)
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.topic)
    }
}
