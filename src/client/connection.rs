//! Connection Manager
//!
//! Owns the transport lifecycle: `Connecting -> Ready -> Terminated`.
//!
//! Entering `Terminated` fails every pending request, closes the outbound
//! queue, and publishes the new state to watchers. There is no way back out
//! of `Terminated`.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::client::correlator::Correlator;
use crate::error::{ClientError, Result};

// == Connection State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport not open yet
    Connecting,
    /// Frames may be sent and received
    Ready,
    /// Transport closed or failed; terminal
    Terminated,
}

// == Termination ==
/// Why the connection reached `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Transport failed before it was open
    ConnectFailed(String),
    /// Transport failed while ready
    TransportError(String),
    /// Remote end closed the channel
    ClosedByServer(Option<String>),
    /// The owner called `close`
    ClosedByClient,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            Termination::TransportError(e) => write!(f, "transport error: {e}"),
            Termination::ClosedByServer(Some(reason)) => write!(f, "server closed: {reason}"),
            Termination::ClosedByServer(None) => f.write_str("server closed"),
            Termination::ClosedByClient => f.write_str("closed by client"),
        }
    }
}

#[derive(Debug, Default)]
struct Link {
    connect_started: bool,
    outbound: Option<mpsc::Sender<String>>,
    termination: Option<Termination>,
}

// == Connection Manager ==
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            state,
            link: Mutex::new(Link::default()),
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.link().termination.clone()
    }

    /// Claims the single connect attempt this client gets.
    pub fn begin_connect(&self) -> Result<()> {
        let mut link = self.link();
        if let Some(cause) = &link.termination {
            return Err(ClientError::ConnectionClosed(cause.to_string()));
        }
        if link.connect_started {
            return Err(ClientError::AlreadyConnected);
        }
        link.connect_started = true;
        Ok(())
    }

    // == Ready ==
    /// Moves `Connecting -> Ready` with the transport's outbound queue.
    ///
    /// Returns false if the connection was terminated while opening; the
    /// queue is dropped in that case.
    pub fn mark_ready(&self, outbound: mpsc::Sender<String>, correlator: &Correlator) -> bool {
        let mut link = self.link();
        if link.termination.is_some() {
            return false;
        }
        link.outbound = Some(outbound);
        correlator.open();
        self.state.send_replace(ConnectionState::Ready);
        info!("connection ready");
        true
    }

    /// Fails with `NotConnected` unless the state is `Ready`.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Connecting | ConnectionState::Terminated => {
                Err(ClientError::NotConnected)
            }
        }
    }

    // == Send ==
    /// Queues a text frame on the transport.
    pub async fn send(&self, text: String) -> Result<()> {
        let outbound = self.link().outbound.clone().ok_or(ClientError::NotConnected)?;
        outbound
            .send(text)
            .await
            .map_err(|_| ClientError::ConnectionClosed("transport outbound queue closed".to_string()))
    }

    // == Terminate ==
    /// Moves to `Terminated`, failing every pending request with
    /// `ConnectionClosed`.
    ///
    /// Returns false if already terminated; the first cause wins.
    pub fn terminate(&self, cause: Termination, correlator: &Correlator) -> bool {
        {
            let mut link = self.link();
            if link.termination.is_some() {
                return false;
            }
            link.termination = Some(cause.clone());
            link.outbound = None;
        }

        let failed = correlator.close_all(&cause.to_string());
        self.state.send_replace(ConnectionState::Terminated);

        match cause {
            Termination::ClosedByClient => {
                info!("connection closed by client, {} pending requests failed", failed)
            }
            Termination::ConnectFailed(_) => warn!("connection terminated: {}", cause),
            _ => error!("connection terminated: {}, {} pending requests failed", cause, failed),
        }
        true
    }

    // == Terminated ==
    /// Waits until the connection is `Terminated` and returns why.
    pub async fn terminated(&self) -> Termination {
        let mut watcher = self.state.subscribe();
        let _ = watcher
            .wait_for(|state| *state == ConnectionState::Terminated)
            .await;
        self.termination().unwrap_or(Termination::ClosedByClient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_starts_connecting() {
        let connection = ConnectionManager::new();
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert!(matches!(connection.ensure_ready(), Err(ClientError::NotConnected)));
        assert!(connection.termination().is_none());
    }

    #[test]
    fn test_ready_then_terminated() {
        let correlator = Correlator::new();
        let connection = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(1);

        assert!(connection.mark_ready(tx, &correlator));
        assert_eq!(connection.state(), ConnectionState::Ready);
        assert!(connection.ensure_ready().is_ok());

        assert!(connection.terminate(Termination::ClosedByServer(None), &correlator));
        assert_eq!(connection.state(), ConnectionState::Terminated);
        assert!(matches!(connection.ensure_ready(), Err(ClientError::NotConnected)));
        assert!(matches!(correlator.register(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_first_termination_cause_wins() {
        let correlator = Correlator::new();
        let connection = ConnectionManager::new();

        assert!(connection.terminate(Termination::TransportError("a".into()), &correlator));
        assert!(!connection.terminate(Termination::ClosedByClient, &correlator));
        assert_eq!(connection.termination(), Some(Termination::TransportError("a".into())));
    }

    #[test]
    fn test_ready_refused_after_termination() {
        let correlator = Correlator::new();
        let connection = ConnectionManager::new();
        connection.terminate(Termination::ClosedByClient, &correlator);

        let (tx, _rx) = mpsc::channel(1);
        assert!(!connection.mark_ready(tx, &correlator));
        assert_eq!(connection.state(), ConnectionState::Terminated);
    }

    #[test]
    fn test_single_connect_attempt() {
        let connection = ConnectionManager::new();
        assert!(connection.begin_connect().is_ok());
        assert!(matches!(connection.begin_connect(), Err(ClientError::AlreadyConnected)));

        connection.terminate(Termination::ClosedByClient, &Correlator::new());
        assert!(matches!(connection.begin_connect(), Err(ClientError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_send_requires_ready() {
        let connection = ConnectionManager::new();
        let result = connection.send("x".to_string()).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_to_dropped_transport() {
        let correlator = Correlator::new();
        let connection = ConnectionManager::new();
        let (tx, rx) = mpsc::channel(1);
        connection.mark_ready(tx, &correlator);
        drop(rx);

        let result = connection.send("x".to_string()).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_terminated_waits_for_cause() {
        let correlator = Arc::new(Correlator::new());
        let connection = Arc::new(ConnectionManager::new());

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.terminated().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        connection.terminate(Termination::ClosedByServer(Some("bye".into())), &correlator);
        let cause = waiter.await.unwrap();
        assert_eq!(cause, Termination::ClosedByServer(Some("bye".into())));
        assert_eq!(cause.to_string(), "server closed: bye");
    }
}
