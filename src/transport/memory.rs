//! In-Memory Transport
//!
//! A client transport wired to a [`RemotePeer`] in the same process. The peer
//! plays the remote service: it reads the frames the client sent and injects
//! responses, expiration notices, closes and errors.
//!
//! Delivery is in order and nothing is dropped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::{ClientError, Result};
use crate::protocol::Frame;
use crate::transport::{Transport, TransportEvent};

/// Creates a connected client transport and its remote peer.
pub fn pair(capacity: usize) -> (Transport, RemotePeer) {
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

    let peer = RemotePeer {
        received: outbound_rx,
        events: inbound_tx,
    };
    (Transport::new(outbound_tx, inbound_rx), peer)
}

/// Remote end of an in-memory transport.
#[derive(Debug)]
pub struct RemotePeer {
    received: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
}

impl RemotePeer {
    // == Reading Client Frames ==
    /// Waits for the next raw frame the client sent.
    ///
    /// Returns None once the client side has dropped its outbound queue.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.received.recv().await
    }

    /// Waits for the next frame the client sent and parses it.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        let text = self.received.recv().await?;
        Frame::parse(&text).ok()
    }

    /// Returns a frame only if one is already queued.
    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        match self.received.try_recv() {
            Ok(text) => Frame::parse(&text).ok(),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    // == Injecting Events ==
    /// Delivers a frame to the client.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.send_text(frame.to_text()?).await
    }

    /// Delivers raw text to the client, valid JSON or not.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.emit(TransportEvent::Frame(text.into())).await
    }

    /// Closes the channel from the remote side.
    pub async fn close(&self, reason: Option<&str>) -> Result<()> {
        self.emit(TransportEvent::Closed(reason.map(str::to_string))).await
    }

    /// Fails the transport.
    pub async fn fail(&self, message: &str) -> Result<()> {
        self.emit(TransportEvent::Error(message.to_string())).await
    }

    async fn emit(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ClientError::ConnectionClosed("client end dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CorrelationId;

    #[tokio::test]
    async fn test_client_frames_reach_peer() {
        let (transport, mut peer) = pair(4);
        let (outbound, _inbound) = transport.into_parts();

        let frame = Frame::get(CorrelationId::from("1"), "a");
        outbound.send(frame.to_text().unwrap()).await.unwrap();

        assert_eq!(peer.recv_frame().await, Some(frame));
        assert!(peer.try_recv_frame().is_none());
    }

    #[tokio::test]
    async fn test_peer_events_reach_client() {
        let (transport, peer) = pair(4);
        let (_outbound, mut inbound) = transport.into_parts();

        peer.send_text("raw").await.unwrap();
        peer.close(Some("bye")).await.unwrap();
        peer.fail("boom").await.unwrap();

        assert_eq!(inbound.recv().await, Some(TransportEvent::Frame("raw".to_string())));
        assert_eq!(inbound.recv().await, Some(TransportEvent::Closed(Some("bye".to_string()))));
        assert_eq!(inbound.recv().await, Some(TransportEvent::Error("boom".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_client_ends_peer_stream() {
        let (transport, mut peer) = pair(4);
        drop(transport);

        assert!(peer.recv_text().await.is_none());
        assert!(matches!(peer.send_text("x").await, Err(ClientError::ConnectionClosed(_))));
    }
}
