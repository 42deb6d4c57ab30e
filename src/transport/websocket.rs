//! WebSocket Transport
//!
//! Opens a WebSocket connection and bridges it to a [`Transport`] with a
//! single pump task that owns the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::transport::{Transport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a WebSocket connection to `url`.
///
/// Fails with `Connect` if the handshake does not complete. Once open, the
/// socket is owned by a background task; dropping the transport's outbound
/// queue closes it.
///
/// # Arguments
/// * `url` - `ws://` endpoint of the cache service
/// * `buffer` - depth of the outbound and inbound queues
pub async fn open(url: &str, buffer: usize) -> Result<Transport> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    info!("WebSocket connection open: {}", url);

    let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
    tokio::spawn(pump(socket, outbound_rx, inbound_tx));

    Ok(Transport::new(outbound_tx, inbound_rx))
}

/// Moves frames between the socket and the transport queues until either
/// side ends, then reports the terminal event.
async fn pump(
    mut socket: Socket,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<TransportEvent>,
) {
    let terminal = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(text) => {
                    if let Err(e) = socket.send(Message::Text(text.into())).await {
                        break TransportEvent::Error(format!("write failed: {e}"));
                    }
                }
                None => {
                    debug!("outbound queue dropped, closing WebSocket");
                    let _ = socket.close(None).await;
                    return;
                }
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Frame(text.as_str().to_owned())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if inbound.send(TransportEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => warn!("dropping non UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = socket.send(Message::Pong(payload)).await {
                        break TransportEvent::Error(format!("pong failed: {e}"));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break TransportEvent::Closed(frame.map(|f| f.reason.as_str().to_owned()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                None => break TransportEvent::Closed(None),
            },
        }
    };

    debug!("WebSocket pump finished: {:?}", terminal);
    let _ = inbound.send(terminal).await;
}
