//! Configuration Module
//!
//! Handles loading and managing client configuration from environment variables.

use std::env;
use std::time::Duration;

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the cache service
    pub url: String,
    /// Default per-request deadline, None = wait until the connection ends
    pub request_timeout: Option<Duration>,
    /// Buffered expiration notices per subscriber before lagging
    pub expiration_capacity: usize,
    /// Outbound frame queue depth
    pub outbound_buffer: usize,
}

impl ClientConfig {
    /// Creates a new ClientConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `KRONCACHE_URL` - WebSocket endpoint (default: ws://localhost:8080)
    /// - `KRONCACHE_REQUEST_TIMEOUT_MS` - Request deadline in ms, 0 disables (default: 30000)
    /// - `KRONCACHE_EXPIRATION_CAPACITY` - Expiration notice buffer (default: 256)
    /// - `KRONCACHE_OUTBOUND_BUFFER` - Outbound queue depth (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let request_timeout = match parse_var::<u64>("KRONCACHE_REQUEST_TIMEOUT_MS") {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.request_timeout,
        };

        Self {
            url: env::var("KRONCACHE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.url),
            request_timeout,
            expiration_capacity: parse_var("KRONCACHE_EXPIRATION_CAPACITY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.expiration_capacity),
            outbound_buffer: parse_var("KRONCACHE_OUTBOUND_BUFFER")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.outbound_buffer),
        }
    }

    /// Sets the endpoint URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the default request deadline.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            expiration_capacity: 256,
            outbound_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://localhost:8080");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.expiration_capacity, 256);
        assert_eq!(config.outbound_buffer, 64);
    }

    // Env vars are process-global, so every env scenario lives in this one test.
    #[test]
    fn test_config_from_env() {
        env::remove_var("KRONCACHE_URL");
        env::remove_var("KRONCACHE_REQUEST_TIMEOUT_MS");
        env::remove_var("KRONCACHE_EXPIRATION_CAPACITY");
        env::remove_var("KRONCACHE_OUTBOUND_BUFFER");

        let config = ClientConfig::from_env();
        assert_eq!(config.url, "ws://localhost:8080");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));

        env::set_var("KRONCACHE_URL", "ws://cache:9000");
        env::set_var("KRONCACHE_REQUEST_TIMEOUT_MS", "0");
        env::set_var("KRONCACHE_EXPIRATION_CAPACITY", "not-a-number");
        let config = ClientConfig::from_env();
        assert_eq!(config.url, "ws://cache:9000");
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.expiration_capacity, 256);

        env::set_var("KRONCACHE_REQUEST_TIMEOUT_MS", "1500");
        let config = ClientConfig::from_env();
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));

        env::remove_var("KRONCACHE_URL");
        env::remove_var("KRONCACHE_REQUEST_TIMEOUT_MS");
        env::remove_var("KRONCACHE_EXPIRATION_CAPACITY");
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_url("ws://example:1")
            .with_request_timeout(None);
        assert_eq!(config.url, "ws://example:1");
        assert!(config.request_timeout.is_none());
    }
}
