//! Event Router
//!
//! Classifies each inbound frame as either a correlated response, handed to
//! the correlator by id, or an unsolicited expiration notice, broadcast to
//! every current subscriber. Frames are routed one at a time in wire order.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::client::correlator::Correlator;
use crate::client::stats::ClientStats;
use crate::error::{ClientError, Result};
use crate::protocol::{current_timestamp_ms, decode, Frame};

// == Expiration Notice ==
/// A stored key expired on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationNotice {
    /// The expired key
    pub key: String,
    /// Last value stored under the key, `Null` if the server sent none
    pub value: Value,
    /// Expiration time (Unix milliseconds)
    pub expired_at: u64,
}

impl ExpirationNotice {
    /// Deserializes the value into an application type.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| ClientError::MalformedEnvelope(e.to_string()))
    }

    /// Expiration time as a UTC datetime.
    pub fn expired_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.expired_at).ok()?)
    }
}

/// What the router did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Completed a pending request
    Resolved,
    /// Response for an id nobody is waiting on
    Unknown,
    /// Expiration published to this many subscribers
    Expired(usize),
    /// Frame violated the protocol and was dropped
    Rejected,
}

// == Event Router ==
#[derive(Debug)]
pub(crate) struct EventRouter {
    expirations: broadcast::Sender<ExpirationNotice>,
}

impl EventRouter {
    /// Creates a router buffering up to `capacity` notices per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (expirations, _) = broadcast::channel(capacity.max(1));
        Self { expirations }
    }

    /// Subscribes to notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExpirationNotice> {
        self.expirations.subscribe()
    }

    // == Route ==
    /// Routes one raw inbound frame.
    ///
    /// Never fails: bad frames are logged, counted, and dropped so the
    /// connection keeps running.
    pub fn route(&self, raw: &str, correlator: &Correlator) -> Routed {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => return reject(correlator, format_args!("unparseable frame: {e}")),
        };

        if frame.is_expiration() {
            return self.publish_expiration(frame, correlator);
        }

        let Some(id) = frame.id else {
            return reject(correlator, format_args!("{} frame without id", frame.action));
        };

        if correlator.resolve(&id, frame.error, frame.data) {
            Routed::Resolved
        } else {
            warn!(%id, "dropping {} for unknown or stale request", frame.action);
            Routed::Unknown
        }
    }

    fn publish_expiration(&self, frame: Frame, correlator: &Correlator) -> Routed {
        let Some(key) = frame.key else {
            return reject(correlator, format_args!("EXPIRED frame without key"));
        };

        let value = match frame.data.as_deref() {
            None => Value::Null,
            Some(raw) => match decode::<Value>(raw) {
                Ok(value) => value,
                Err(e) => return reject(correlator, format_args!("EXPIRED {key}: {e}")),
            },
        };

        let notice = ExpirationNotice {
            key,
            value,
            expired_at: frame.expire.unwrap_or_else(current_timestamp_ms),
        };
        correlator.record(ClientStats::record_expiration);

        // No subscribers is fine; notices are fire-and-forget.
        let subscribers = self.expirations.send(notice).unwrap_or(0);
        debug!("expiration delivered to {} subscribers", subscribers);
        Routed::Expired(subscribers)
    }
}

fn reject(correlator: &Correlator, reason: std::fmt::Arguments<'_>) -> Routed {
    warn!("protocol error: {}", reason);
    correlator.record(ClientStats::record_protocol_error);
    Routed::Rejected
}
