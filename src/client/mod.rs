//! Client Module
//!
//! The [`CacheClient`] multiplexes cache operations over one persistent
//! connection.
//!
//! # Architecture
//! - `correlator` - id -> oneshot table matching responses to requests
//! - `router` - classifies inbound frames as responses or expiration notices
//! - `connection` - `Connecting -> Ready -> Terminated` lifecycle
//! - `stats` - request and routing counters
//!
//! A background receive loop reads transport events in order, hands frames
//! to the router, and terminates the connection on close or error.

mod connection;
mod correlator;
mod router;
mod stats;

pub use connection::{ConnectionState, Termination};
pub use router::ExpirationNotice;
pub use stats::ClientStats;

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{decode, encode, normalize, Action, CorrelationId, Expiry, Frame};
use crate::transport::{websocket, Transport, TransportEvent};
use connection::ConnectionManager;
use correlator::Correlator;
use router::EventRouter;

struct Shared {
    config: ClientConfig,
    connection: ConnectionManager,
    correlator: Correlator,
    router: EventRouter,
}

// == Cache Client ==
/// Async client for the cache service.
///
/// Cheap to clone; clones share the connection. Dropping the last clone
/// closes the transport.
///
/// # Example
/// ```no_run
/// use kroncache::{CacheClient, ClientConfig};
/// use serde_json::{json, Value};
///
/// # async fn example() -> kroncache::Result<()> {
/// let client = CacheClient::new(ClientConfig::from_env());
/// client.connect().await?;
///
/// client.set("session", "10 minutes", &json!({"user": 7})).await?;
/// let session: Value = client.get("session").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheClient {
    shared: Arc<Shared>,
    request_timeout: Option<Duration>,
}

impl CacheClient {
    // == Constructors ==
    /// Creates a client in the `Connecting` state. Nothing is opened until
    /// `connect` or `connect_with` is called.
    pub fn new(config: ClientConfig) -> Self {
        let request_timeout = config.request_timeout;
        let shared = Shared {
            connection: ConnectionManager::new(),
            correlator: Correlator::new(),
            router: EventRouter::new(config.expiration_capacity),
            config,
        };
        Self {
            shared: Arc::new(shared),
            request_timeout,
        }
    }

    /// Creates a client and connects it to the configured WebSocket endpoint.
    pub async fn connect_to(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    /// Returns a handle on the same connection using a different request
    /// deadline. `None` waits until the connection terminates.
    pub fn with_request_timeout(&self, timeout: Option<Duration>) -> Self {
        Self {
            shared: self.shared.clone(),
            request_timeout: timeout,
        }
    }

    // == Connect ==
    /// Opens the WebSocket endpoint from the configuration.
    ///
    /// # Errors
    /// - `Connect` if the transport fails before it is open; the client is
    ///   then `Terminated`
    /// - `AlreadyConnected` / `ConnectionClosed` if a connect was already made
    pub async fn connect(&self) -> Result<()> {
        let url = self.shared.config.url.clone();
        let buffer = self.shared.config.outbound_buffer;
        info!("Connecting to {}", url);
        self.connect_with(websocket::open(&url, buffer)).await
    }

    /// Drives `opening` to completion and attaches the resulting transport.
    ///
    /// Operations issued while `opening` is pending fail with `NotConnected`.
    pub async fn connect_with<F>(&self, opening: F) -> Result<()>
    where
        F: Future<Output = Result<Transport>>,
    {
        let shared = &self.shared;
        shared.connection.begin_connect()?;

        let attempt = ConnectAttempt::new(shared);
        let opened = opening.await;
        attempt.disarm();

        match opened {
            Ok(transport) => {
                let (outbound, inbound) = transport.into_parts();
                if !shared.connection.mark_ready(outbound, &shared.correlator) {
                    let cause = shared
                        .connection
                        .termination()
                        .unwrap_or(Termination::ClosedByClient);
                    return Err(ClientError::ConnectionClosed(cause.to_string()));
                }
                spawn_receive_loop(Arc::downgrade(shared), inbound);
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    ClientError::Connect(message) => message,
                    other => other.to_string(),
                };
                shared.connection.terminate(
                    Termination::ConnectFailed(message.clone()),
                    &shared.correlator,
                );
                Err(ClientError::Connect(message))
            }
        }
    }

    // == Close ==
    /// Terminates the connection. Pending requests fail with
    /// `ConnectionClosed`; later operations fail with `NotConnected`.
    pub fn close(&self) {
        self.shared
            .connection
            .terminate(Termination::ClosedByClient, &self.shared.correlator);
    }

    // == Set ==
    /// Stores `data` under `key` until `expire` from now.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `expire` - Milliseconds, a `Duration`, or a string such as `"10 seconds"`
    /// * `data` - Any serializable value
    pub async fn set<T>(&self, key: &str, expire: impl Into<Expiry>, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.shared.connection.ensure_ready()?;
        let expire = normalize(&expire.into())?;
        let data = encode(data)?;

        self.issue(Some(key), move |id| Frame::set(id, key, data, expire))
            .await?;
        Ok(())
    }

    // == Batch ==
    /// Adds `data` to the batch stored under `key`, expiring `expire` from now.
    ///
    /// # Arguments
    /// * `key` - The batch key
    /// * `expire` - Milliseconds, a `Duration`, or a string such as `"1 hour"`
    /// * `data` - Any serializable value
    pub async fn add_to_batch<T>(&self, key: &str, expire: impl Into<Expiry>, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.shared.connection.ensure_ready()?;
        let expire = normalize(&expire.into())?;
        let data = encode(data)?;

        self.issue(Some(key), move |id| Frame::batch(id, key, data, expire))
            .await?;
        Ok(())
    }

    // == Get ==
    /// Retrieves the value stored under `key`.
    ///
    /// # Errors
    /// - `NotFound` if the server has no such key
    /// - `MalformedEnvelope` if the stored payload does not decode into `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.shared.connection.ensure_ready()?;
        let data = self.issue(Some(key), |id| Frame::get(id, key)).await?;

        let raw = data.ok_or_else(|| {
            ClientError::MalformedEnvelope(format!("GET {key} response carried no data"))
        })?;
        decode(&raw)
    }

    /// Retrieves every stored value whose key matches the regular
    /// expression `pattern`. The pattern is evaluated by the server.
    ///
    /// # Errors
    /// - `MalformedEnvelope` if the response is not a JSON array of records
    ///   or a record does not decode into `T`
    pub async fn get_matching<T: DeserializeOwned>(&self, pattern: &str) -> Result<Vec<T>> {
        self.shared.connection.ensure_ready()?;
        let data = self
            .issue(None, |id| Frame::get_matching(id, pattern))
            .await?;

        let records = match data.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str::<Option<Vec<String>>>(raw)
                .map(Option::unwrap_or_default)
                .map_err(|e| ClientError::MalformedEnvelope(format!("GET /{pattern}/ response: {e}")))?,
        };
        records.iter().map(|record| decode(record)).collect()
    }

    // == Purge ==
    /// Removes every key on the server.
    pub async fn purge_all(&self) -> Result<()> {
        self.shared.connection.ensure_ready()?;
        self.issue(None, Frame::purge).await?;
        Ok(())
    }

    // == Delete ==
    /// Removes a single key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.shared.connection.ensure_ready()?;
        self.issue(Some(key), |id| Frame::delete(id, key)).await?;
        Ok(())
    }

    // == Keys ==
    /// Lists the keys currently stored on the server.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.shared.connection.ensure_ready()?;
        let data = self.issue(None, Frame::keys).await?;

        match data.as_deref() {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str::<Option<Vec<String>>>(raw)
                .map(Option::unwrap_or_default)
                .map_err(|e| ClientError::MalformedEnvelope(format!("KEYS response: {e}"))),
        }
    }

    // == Counters ==
    /// Adds `by` to the integer stored under `key` and returns the new value.
    pub async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.counter(Action::Increment, key, by).await
    }

    /// Subtracts `by` from the integer stored under `key` and returns the new value.
    pub async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.counter(Action::Decrement, key, by).await
    }

    async fn counter(&self, action: Action, key: &str, by: i64) -> Result<i64> {
        self.shared.connection.ensure_ready()?;
        let label = action.to_string();
        let data = self
            .issue(Some(key), move |id| Frame::counter(id, action, key, by))
            .await?;

        let raw = data.unwrap_or_default();
        raw.trim().parse().map_err(|_| {
            ClientError::MalformedEnvelope(format!("{label} {key} returned non-integer {raw:?}"))
        })
    }

    /// Issues a request and maps server errors for `key`.
    async fn issue<F>(&self, key: Option<&str>, build: F) -> Result<Option<String>>
    where
        F: FnOnce(CorrelationId) -> Frame,
    {
        self.shared
            .correlator
            .issue(&self.shared.connection, build, self.request_timeout)
            .await
            .map_err(|e| match e {
                ClientError::Server(message) => ClientError::from_server(message, key),
                other => other,
            })
    }

    // == Observers ==
    /// Subscribes to expiration notices published from now on.
    ///
    /// Slow subscribers that fall more than the configured capacity behind
    /// see `RecvError::Lagged`.
    pub fn subscribe_expirations(&self) -> broadcast::Receiver<ExpirationNotice> {
        self.shared.router.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.watch()
    }

    /// Resolves once the connection is `Terminated`, with the cause.
    pub async fn terminated(&self) -> Termination {
        self.shared.connection.terminated().await
    }

    /// Snapshot of request and routing counters.
    pub fn stats(&self) -> ClientStats {
        self.shared.correlator.stats()
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.len()
    }

    /// Configuration the client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

/// Terminates the connection if a connect attempt is dropped before the
/// transport finishes opening.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self { shared, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.connection.terminate(
                Termination::ConnectFailed("connect cancelled".to_string()),
                &self.shared.correlator,
            );
        }
    }
}

/// Reads transport events in order until the transport ends or the client
/// is dropped.
fn spawn_receive_loop(
    shared: Weak<Shared>,
    mut inbound: mpsc::Receiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = inbound.recv().await;
            let Some(shared) = shared.upgrade() else {
                debug!("client dropped, receive loop exiting");
                break;
            };

            let cause = match event {
                Some(TransportEvent::Frame(text)) => {
                    shared.router.route(&text, &shared.correlator);
                    continue;
                }
                Some(TransportEvent::Closed(reason)) => Termination::ClosedByServer(reason),
                Some(TransportEvent::Error(message)) => Termination::TransportError(message),
                None => Termination::TransportError("transport dropped".to_string()),
            };
            shared.connection.terminate(cause, &shared.correlator);
            break;
        }
    })
}
