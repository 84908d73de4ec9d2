//! Application Layer - Port definitions.
//!
//! The realtime client is written against these ports so tests can swap the
//! socket and the token store for in-memory doubles.

/// Port interfaces for external systems (socket, token storage).
pub mod ports;
