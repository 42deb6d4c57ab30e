//! Client Statistics Module
//!
//! Tracks request correlation and inbound routing counters.

use serde::Serialize;

// == Client Stats ==
/// Snapshot of the client's request and routing counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ClientStats {
    /// Requests registered with the correlator
    pub requests_issued: u64,
    /// Responses matched to a pending request
    pub responses_matched: u64,
    /// Responses dropped because no request was waiting for their id
    pub unknown_responses: u64,
    /// Requests that hit their deadline
    pub timeouts: u64,
    /// Expiration notices routed to subscribers
    pub expirations_delivered: u64,
    /// Inbound frames that could not be routed
    pub protocol_errors: u64,
    /// Requests currently waiting for a response
    pub pending: usize,
}

impl ClientStats {
    // == Constructor ==
    /// Creates a new ClientStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Match Rate ==
    /// Fraction of issued requests that received their response.
    ///
    /// Returns 0.0 if no requests have been issued.
    pub fn match_rate(&self) -> f64 {
        if self.requests_issued == 0 {
            0.0
        } else {
            self.responses_matched as f64 / self.requests_issued as f64
        }
    }

    pub fn record_request(&mut self) {
        self.requests_issued += 1;
    }

    pub fn record_match(&mut self) {
        self.responses_matched += 1;
    }

    pub fn record_unknown(&mut self) {
        self.unknown_responses += 1;
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations_delivered += 1;
    }

    pub fn record_protocol_error(&mut self) {
        self.protocol_errors += 1;
    }

    // == Update Pending Count ==
    pub fn set_pending(&mut self, count: usize) {
        self.pending = count;
    }
}
