//! Configuration types for database adapters.
//!
//! - `ConnectionDescriptor`: target database and credentials (redacted on output)
//! - `ConnectionConfig`: timeouts, pool size and read-only enforcement

mod connection;

pub use connection::{ConnectionConfig, ConnectionDescriptor};
