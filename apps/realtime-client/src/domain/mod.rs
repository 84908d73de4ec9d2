//! Domain Layer - Core realtime types and business logic.
//!
//! Pure types with no I/O: the wire envelope, the connection lifecycle and
//! the subscriber registry that fans events out to application code.

/// Connection phases, transport ready states and close codes.
pub mod connection;

/// Wire envelope and well-known event names.
pub mod envelope;

/// Event name → ordered handler list.
pub mod registry;
