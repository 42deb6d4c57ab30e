//! Transport Module
//!
//! A transport is a duplex channel of discrete text frames. The client only
//! ever sees the two queues held by [`Transport`]; how frames reach the
//! remote service is up to the implementation.
//!
//! # Implementations
//! - `websocket` - tokio-tungstenite client connection
//! - `memory` - in-process pair driven by a [`memory::RemotePeer`]

pub mod memory;
pub mod websocket;

use tokio::sync::mpsc;

// == Transport Event ==
/// Something the transport observed on the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text frame
    Frame(String),
    /// Remote end closed the channel, with its reason if one was given
    Closed(Option<String>),
    /// Transport failed
    Error(String),
}

// == Transport ==
/// Client-side end of an open transport.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl Transport {
    /// Creates a transport from its outbound queue and inbound event stream.
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<TransportEvent>) -> Self {
        Self { outbound, inbound }
    }

    /// Splits the transport into its queues.
    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<TransportEvent>) {
        (self.outbound, self.inbound)
    }
}
