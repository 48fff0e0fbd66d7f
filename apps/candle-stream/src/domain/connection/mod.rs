//! Connection Lifecycle
//!
//! The connection state machine as a pure transition function. The driver,
//! `application::services::ConnectionManager`, executes the returned effects
//! and feeds transport and timer outcomes back in as events.
//!
//! # States
//!
//! ```text
//! Disconnected --Connect--> Connecting --Opened--> Connected
//! Connecting/Connected --Failed/Closed--> (attempts < max) Reconnecting
//!                                         (attempts == max) Terminated
//! Reconnecting --TimerElapsed--> Connecting
//! any --Shutdown--> Terminated
//! ```
//!
//! A failure passes through `Disconnected` conceptually; the transition
//! resolves it immediately to `Reconnecting` or `Terminated`. The collapse is
//! intentional: state watchers see `Connected -> Reconnecting` and never a
//! transient `Disconnected`, which only names a session not yet started.

use std::time::Duration;

use serde::Serialize;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3_000);

/// Default number of consecutive failures before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// =============================================================================
// State
// =============================================================================

/// Connection state for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and no connect requested yet.
    #[default]
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Transport open and subscribed.
    Connected,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// No further automatic transitions.
    Terminated,
}

impl ConnectionState {
    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }

    /// Whether the state is absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Numeric encoding for the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Terminated => 4.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Host requested a connection.
    Connect,
    /// Transport reported a successful open.
    Opened,
    /// Transport failed to open or errored mid-stream.
    Failed(String),
    /// Remote side closed the connection.
    Closed,
    /// Reconnect timer fired.
    TimerElapsed,
    /// Host requested teardown.
    Shutdown,
}

/// Side effects the driver must perform, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Open the transport.
    OpenTransport,
    /// Send the subscription frame.
    SendSubscribe,
    /// Arm the single reconnect timer.
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer if armed.
    CancelReconnect,
    /// Close the transport if open.
    CloseTransport,
}

/// State plus consecutive failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive failures since the last successful open.
    pub attempts: u32,
}

// =============================================================================
// Policy
// =============================================================================

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before each reconnect attempt.
    pub delay: Duration,
    /// Consecutive failures allowed before terminating. Zero terminates on
    /// the first failure.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempts` failures.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

// =============================================================================
// Transition
// =============================================================================

/// Compute the next snapshot and the effects to run.
///
/// Events that have no edge from the current state are ignored and yield no
/// effects. `Terminated` ignores everything, which makes shutdown idempotent.
#[must_use]
pub fn transition(
    snapshot: Snapshot,
    event: &ConnectionEvent,
    policy: &ReconnectPolicy,
) -> (Snapshot, Vec<Effect>) {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (snapshot.state, event) {
        (S::Terminated, _) => (snapshot, Vec::new()),

        (_, E::Shutdown) => (
            Snapshot {
                state: S::Terminated,
                ..snapshot
            },
            vec![Effect::CancelReconnect, Effect::CloseTransport],
        ),

        (S::Disconnected, E::Connect) | (S::Reconnecting, E::TimerElapsed) => (
            Snapshot {
                state: S::Connecting,
                ..snapshot
            },
            vec![Effect::OpenTransport],
        ),

        (S::Connecting, E::Opened) => (
            Snapshot {
                state: S::Connected,
                attempts: 0,
            },
            vec![Effect::SendSubscribe],
        ),

        (S::Connecting | S::Connected, E::Failed(_) | E::Closed) => {
            let attempts = snapshot.attempts.saturating_add(1);
            if policy.should_retry(attempts) {
                (
                    Snapshot {
                        state: S::Reconnecting,
                        attempts,
                    },
                    vec![Effect::CloseTransport, Effect::ScheduleReconnect(policy.delay)],
                )
            } else {
                (
                    Snapshot {
                        state: S::Terminated,
                        attempts,
                    },
                    vec![Effect::CloseTransport],
                )
            }
        }

        _ => (snapshot, Vec::new()),
    }
}

/// Stateful wrapper over [`transition`].
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    snapshot: Snapshot,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    /// Create a machine in `Disconnected` with zero attempts.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            snapshot: Snapshot::default(),
            policy,
        }
    }

    /// Apply an event, returning the effects to execute.
    pub fn handle(&mut self, event: &ConnectionEvent) -> Vec<Effect> {
        let (next, effects) = transition(self.snapshot, event, &self.policy);
        if next.state != self.snapshot.state {
            tracing::debug!(
                from = self.snapshot.state.as_str(),
                to = next.state.as_str(),
                attempts = next.attempts,
                "Connection state transition"
            );
        }
        self.snapshot = next;
        effects
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.snapshot.state
    }

    /// Consecutive failures since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.snapshot.attempts
    }

    /// Current snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
