//! Error types for the cache client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Client Error Enum ==
/// Unified error type for the cache client.
///
/// Per-request variants only ever reach the caller of that request.
/// `ConnectionClosed` is the one variant delivered to every in-flight request
/// at once, when the transport terminates.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Operation attempted while the connection is not `Ready`
    #[error("Not connected")]
    NotConnected,

    /// `connect` called on a client that already has a transport
    #[error("Already connected")]
    AlreadyConnected,

    /// Expiry string could not be parsed as a duration
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Payload could not be unwrapped from its envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No response arrived before the request deadline
    #[error("Request timed out")]
    RequestTimeout,

    /// Server reported that the key does not exist
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Any other error reported by the server
    #[error("Server error: {0}")]
    Server(String),

    /// Transport terminated while the request was pending
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Transport failed before it was open
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Inbound frame violated the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Outbound frame could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Server error code for a missing key.
pub const NOT_FOUND_CODE: &str = "NOT_FOUND";

impl ClientError {
    // == Server Error Mapping ==
    /// Classifies a server-reported error message for a request on `key`.
    ///
    /// `NOT_FOUND` is the dedicated code; messages containing "not found" are
    /// accepted too since older servers send free-form text.
    pub fn from_server(message: String, key: Option<&str>) -> Self {
        let missing = message == NOT_FOUND_CODE || message.to_lowercase().contains("not found");
        match (missing, key) {
            (true, Some(key)) => ClientError::NotFound(key.to_string()),
            (true, None) => ClientError::NotFound(message),
            (false, _) => ClientError::Server(message),
        }
    }

    /// Returns true for failures caused by the connection rather than the request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected | ClientError::ConnectionClosed(_) | ClientError::Connect(_)
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache client.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_code_maps_to_key() {
        let err = ClientError::from_server("NOT_FOUND".to_string(), Some("a"));
        assert!(matches!(err, ClientError::NotFound(ref k) if k == "a"));
    }

    #[test]
    fn test_not_found_message_is_case_insensitive() {
        let err = ClientError::from_server("Key Not Found".to_string(), Some("b"));
        assert!(matches!(err, ClientError::NotFound(ref k) if k == "b"));
    }

    #[test]
    fn test_not_found_without_key_keeps_message() {
        let err = ClientError::from_server("NOT_FOUND".to_string(), None);
        assert!(matches!(err, ClientError::NotFound(ref m) if m == "NOT_FOUND"));
    }

    #[test]
    fn test_other_messages_are_server_errors() {
        let err = ClientError::from_server("disk full".to_string(), Some("a"));
        assert!(matches!(err, ClientError::Server(ref m) if m == "disk full"));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_connection_errors() {
        assert!(ClientError::NotConnected.is_connection_error());
        assert!(ClientError::ConnectionClosed("bye".into()).is_connection_error());
        assert!(!ClientError::RequestTimeout.is_connection_error());
    }
}
