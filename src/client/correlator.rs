//! Request Correlator
//!
//! Assigns a correlation id to every outbound request and parks a oneshot
//! completion slot under that id until the matching response, the request
//! deadline, or connection termination resolves it.
//!
//! # Concurrency
//!
//! The pending table is the only shared mutable state. Every insert, lookup
//! and removal happens under one mutex, and completions are sent while the
//! lock is held, so a removed entry always has its outcome already delivered.
//! The lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};

use crate::client::connection::ConnectionManager;
use crate::client::stats::ClientStats;
use crate::error::{ClientError, Result};
use crate::protocol::{CorrelationId, Frame};

/// Outcome delivered to a waiting request: the raw `data` field on success.
pub(crate) type Reply = Result<Option<String>>;

/// Acquire a mutex guard, ignoring poisoning.
///
/// The table holds no invariant spanning more than one entry, so the state
/// left by a panicking holder is still usable.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// == Pending Request ==
/// A request waiting for its response.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    registered_at: Instant,
    completion: oneshot::Sender<Reply>,
}

#[derive(Debug, Default)]
struct PendingTable {
    /// False before the connection is ready and after it terminates
    accepting: bool,
    requests: HashMap<CorrelationId, PendingRequest>,
    stats: ClientStats,
}

// == Correlator ==
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    table: Mutex<PendingTable>,
}

/// Removes the pending entry if the issuing future is dropped early.
struct CancelOnDrop<'a> {
    correlator: &'a Correlator,
    id: CorrelationId,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(&self.id);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    // == Issue ==
    /// Registers a request, sends the frame built for its id, and waits for
    /// the outcome.
    ///
    /// # Arguments
    /// * `connection` - where the frame is sent
    /// * `build` - builds the request frame for the assigned id
    /// * `deadline` - optional time limit covering both the send and the
    ///   wait; on expiry the entry is removed and a late response for the id
    ///   is treated as unknown
    pub async fn issue<F>(
        &self,
        connection: &ConnectionManager,
        build: F,
        deadline: Option<Duration>,
    ) -> Reply
    where
        F: FnOnce(CorrelationId) -> Frame,
    {
        let (id, mut slot) = self.register()?;
        let _guard = CancelOnDrop {
            correlator: self,
            id: id.clone(),
        };

        let text = build(id.clone()).to_text()?;

        // Termination completes the slot while the send may still be parked on
        // a full queue, so the send races the slot.
        let exchange = async {
            tokio::select! {
                delivered = &mut slot => return delivered.ok(),
                sent = connection.send(text) => {
                    if let Err(e) = sent {
                        return Some(Err(e));
                    }
                }
            }
            (&mut slot).await.ok()
        };

        let delivered = match deadline {
            None => exchange.await,
            Some(limit) => {
                let raced = time::timeout(limit, exchange).await;
                match raced {
                    Ok(delivered) => delivered,
                    Err(_elapsed) => {
                        if self.cancel(&id) {
                            self.record(ClientStats::record_timeout);
                            debug!(%id, "request timed out after {:?}", limit);
                            return Err(ClientError::RequestTimeout);
                        }
                        // Resolved while the timer fired; the outcome is already in the slot.
                        slot.try_recv().ok()
                    }
                }
            }
        };

        delivered.unwrap_or_else(|| {
            Err(ClientError::ConnectionClosed(
                "pending request dropped without an outcome".to_string(),
            ))
        })
    }

    // == Register ==
    /// Allocates a fresh id and parks a completion slot under it.
    ///
    /// Fails with `NotConnected` unless the table is accepting requests.
    pub fn register(&self) -> Result<(CorrelationId, oneshot::Receiver<Reply>)> {
        let mut table = lock_ignore_poison(&self.table);
        if !table.accepting {
            return Err(ClientError::NotConnected);
        }

        let id = loop {
            let candidate = CorrelationId::generate();
            if !table.requests.contains_key(&candidate) {
                break candidate;
            }
            warn!(%candidate, "correlation id already pending, regenerating");
        };

        let (completion, slot) = oneshot::channel();
        table.requests.insert(
            id.clone(),
            PendingRequest {
                registered_at: Instant::now(),
                completion,
            },
        );
        table.stats.record_request();
        Ok((id, slot))
    }

    // == Resolve ==
    /// Completes the request registered under `id`.
    ///
    /// A non-empty `error` rejects the request with a server error; otherwise
    /// it resolves with `data`. Returns false if no request is pending under
    /// `id`, which covers stale, duplicate and unknown responses.
    pub fn resolve(&self, id: &CorrelationId, error: Option<String>, data: Option<String>) -> bool {
        let mut table = lock_ignore_poison(&self.table);
        let Some(pending) = table.requests.remove(id) else {
            table.stats.record_unknown();
            return false;
        };
        table.stats.record_match();

        let outcome = match error.filter(|message| !message.is_empty()) {
            Some(message) => Err(ClientError::Server(message)),
            None => Ok(data),
        };
        debug!(%id, "response after {:?}", pending.registered_at.elapsed());
        if pending.completion.send(outcome).is_err() {
            debug!(%id, "caller stopped waiting before the response arrived");
        }
        true
    }

    // == Cancel ==
    /// Removes the request under `id` without completing it.
    ///
    /// Returns true if it was still pending.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        lock_ignore_poison(&self.table).requests.remove(id).is_some()
    }

    // == Open / Close ==
    /// Starts accepting registrations.
    pub fn open(&self) {
        lock_ignore_poison(&self.table).accepting = true;
    }

    /// Stops accepting registrations and fails every pending request with
    /// `ConnectionClosed`. Returns the number of requests failed.
    pub fn close_all(&self, reason: &str) -> usize {
        let mut table = lock_ignore_poison(&self.table);
        table.accepting = false;

        let drained: Vec<_> = table.requests.drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending
                .completion
                .send(Err(ClientError::ConnectionClosed(reason.to_string())));
        }
        count
    }

    // == Stats ==
    /// Applies `update` to the counters.
    pub fn record(&self, update: impl FnOnce(&mut ClientStats)) {
        update(&mut lock_ignore_poison(&self.table).stats);
    }

    /// Returns a snapshot of the counters including the pending count.
    pub fn stats(&self) -> ClientStats {
        let table = lock_ignore_poison(&self.table);
        let mut stats = table.stats.clone();
        stats.set_pending(table.requests.len());
        stats
    }

    /// Returns the number of requests waiting for a response.
    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.table).requests.len()
    }
}
