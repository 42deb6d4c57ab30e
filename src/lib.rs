//! Kroncache - async client for the Kroncache key-value service
//!
//! Multiplexes set/get/purge requests over one persistent WebSocket
//! connection, correlates each response with its request by id, and
//! broadcasts the server's unsolicited key-expiration notices.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{CacheClient, ClientStats, ConnectionState, ExpirationNotice, Termination};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use protocol::Expiry;
