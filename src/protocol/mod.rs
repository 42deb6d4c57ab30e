//! Protocol Module
//!
//! Wire types and pure codecs shared by the client and the transports.

mod correlation;
mod envelope;
mod frame;
mod ttl;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use correlation::CorrelationId;
pub use envelope::{decode, encode, Envelope};
pub use frame::{Action, Frame};
pub use ttl::{current_timestamp_ms, normalize, normalize_at, parse_duration_ms, Expiry};
