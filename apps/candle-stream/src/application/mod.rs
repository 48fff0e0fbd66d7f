//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the message router, the connection manager, the
//! session object, and the port interfaces they drive.

/// Port interfaces for the transport and rendering sink.
pub mod ports;

/// Message routing and session lifecycle.
pub mod services;
