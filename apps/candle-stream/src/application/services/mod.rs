//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `MessageRouter`: dispatches decoded payloads to the aggregator or the
//!   keepalive responder
//! - `ConnectionManager`: drives the connection state machine over a
//!   transport
//! - `StreamSession`: owns one of each for the lifetime of a session

mod connection;
mod router;
mod session;

pub use connection::ConnectionManager;
pub use router::{Dispatch, MARKET_DATA_TYPE, MessageRouter, PING_TYPE, RoutingError, parse_tick};
pub use session::{SessionError, StreamSession};
