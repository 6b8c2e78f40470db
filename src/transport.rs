//! Frames the named-event protocol over a WebSocket connection with a
//! `get`/`put`/`flush` shape, backed by `tokio-tungstenite` rather than a
//! fixed-width binary codec.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use crate::protocol::{ClientEvent, ServerEvent};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed")]
    Closed,
    #[error("frame of {len} bytes exceeds the {limit}-byte limit")]
    FrameTooLarge { len: usize, limit: usize },
}

/// One inbound poll result: either a decoded event, or a malformed/unknown
/// frame that should be silently dropped without ending the connection.
pub enum Inbound {
    Event(ClientEvent),
    Dropped,
}

pub struct MessageIO {
    ws: WebSocketStream<TcpStream>,
    max_frame_len: usize,
}

impl MessageIO {
    pub fn new(ws: WebSocketStream<TcpStream>, max_frame_len: usize) -> Self {
        MessageIO { ws, max_frame_len }
    }

    /// Waits for the next client event. Returns `Ok(None)` once the peer
    /// has closed the connection cleanly. An oversized frame is a transport
    /// error, not a dropped frame: the caller disconnects.
    pub async fn get(&mut self) -> Result<Option<Inbound>, TransportError> {
        loop {
            let Some(msg) = self.ws.next().await else {
                return Ok(None);
            };
            let msg = msg?;
            match msg {
                WsMessage::Text(text) => {
                    if text.len() > self.max_frame_len {
                        return Err(TransportError::FrameTooLarge {
                            len: text.len(),
                            limit: self.max_frame_len,
                        });
                    }
                    return Ok(Some(decode(&text)));
                }
                WsMessage::Binary(bytes) => {
                    if bytes.len() > self.max_frame_len {
                        return Err(TransportError::FrameTooLarge {
                            len: bytes.len(),
                            limit: self.max_frame_len,
                        });
                    }
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => return Ok(Some(decode(text))),
                        Err(_) => return Ok(Some(Inbound::Dropped)),
                    }
                }
                WsMessage::Close(_) => return Ok(None),
                _ => continue,
            }
        }
    }

    pub async fn put(&mut self, event: ServerEvent) -> Result<(), TransportError> {
        trace!(?event, "outbound");
        self.ws.feed(WsMessage::Text(event.encode())).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        self.ws.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<WsMessage>::close(&mut self.ws).await?;
        Ok(())
    }
}

fn decode(text: &str) -> Inbound {
    match ClientEvent::decode(text) {
        Ok(event) => Inbound::Event(event),
        Err(e) => {
            debug!(error = %e, "dropping malformed/unknown event frame");
            Inbound::Dropped
        }
    }
}
