//! The named-event envelope exchanged over the WebSocket transport.
//!
//! Every frame is a JSON object `{ "event": <name>, "data": <payload> }`.
//! Inbound frames decode into [`ClientEvent`]; outbound frames encode from
//! [`ServerEvent`]. Signaling payloads (`offer`/`answer`/`ice-candidate`)
//! are carried as opaque [`serde_json::Value`] — the core never inspects
//! them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::interests::RawInterests;
use crate::session::ClientId;

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    event: &'a str,
    data: Value,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("missing or invalid field in {event:?} payload: {field}")]
    MissingField { event: String, field: &'static str },
}

/// Events a client may send.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    FindPartner(RawInterests),
    SendMessage { text: String },
    Offer { offer: Value },
    Answer { to: ClientId, answer: Value },
    IceCandidate { candidate: Value },
    StopVideo,
    Skip(Option<RawInterests>),
    LeaveChat,
}

impl ClientEvent {
    /// Decodes one text frame. Malformed payloads and unknown events are
    /// reported as [`DecodeError`] so the caller can log-and-drop without
    /// ever surfacing an error event to the client.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let envelope: InboundEnvelope = serde_json::from_str(frame)?;
        let event = envelope.event.as_str();
        let data = envelope.data;
        match event {
            "find_partner" => Ok(ClientEvent::FindPartner(parse_raw_interests(data))),
            "send_message" => {
                let text = data
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing(event, "text"))?
                    .to_string();
                Ok(ClientEvent::SendMessage { text })
            }
            "offer" => {
                let offer = data
                    .get("offer")
                    .cloned()
                    .ok_or_else(|| missing(event, "offer"))?;
                Ok(ClientEvent::Offer { offer })
            }
            "answer" => {
                let to = data
                    .get("to")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing(event, "to"))?;
                let answer = data
                    .get("answer")
                    .cloned()
                    .ok_or_else(|| missing(event, "answer"))?;
                Ok(ClientEvent::Answer {
                    to: ClientId::from(to.to_string()),
                    answer,
                })
            }
            "ice-candidate" => {
                let candidate = data
                    .get("candidate")
                    .cloned()
                    .ok_or_else(|| missing(event, "candidate"))?;
                Ok(ClientEvent::IceCandidate { candidate })
            }
            "stop_video" => Ok(ClientEvent::StopVideo),
            "skip" => {
                if data.is_null() {
                    Ok(ClientEvent::Skip(None))
                } else {
                    Ok(ClientEvent::Skip(Some(parse_raw_interests(data))))
                }
            }
            "leaveChat" => Ok(ClientEvent::LeaveChat),
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }
}

fn missing(event: &str, field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        event: event.to_string(),
        field,
    }
}

fn parse_raw_interests(data: Value) -> RawInterests {
    match data {
        Value::Array(items) => RawInterests::List(
            items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(s) => RawInterests::Single(s),
        _ => RawInterests::Single(String::new()),
    }
}

/// Events the server may send.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Waiting(String),
    PartnerFound(ClientId),
    ReceiveMessage { sender: Sender, text: String },
    Offer { from: ClientId, offer: Value },
    Answer { from: ClientId, answer: Value },
    IceCandidate { from: ClientId, candidate: Value },
    StopVideo,
    PartnerDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Me,
    Partner,
}

impl ServerEvent {
    pub fn encode(&self) -> String {
        let (event, data) = match self {
            ServerEvent::Waiting(msg) => ("waiting", Value::String(msg.clone())),
            ServerEvent::PartnerFound(id) => ("partner_found", Value::String(id.to_string())),
            ServerEvent::ReceiveMessage { sender, text } => (
                "receive_message",
                serde_json::json!({ "sender": sender, "text": text }),
            ),
            ServerEvent::Offer { from, offer } => (
                "offer",
                serde_json::json!({ "from": from.to_string(), "offer": offer }),
            ),
            ServerEvent::Answer { from, answer } => (
                "answer",
                serde_json::json!({ "from": from.to_string(), "answer": answer }),
            ),
            ServerEvent::IceCandidate { from, candidate } => (
                "ice-candidate",
                serde_json::json!({ "from": from.to_string(), "candidate": candidate }),
            ),
            ServerEvent::StopVideo => ("stop_video", Value::Null),
            ServerEvent::PartnerDisconnected => ("partner_disconnected", Value::Null),
        };
        // An envelope built from known-good `Value`s never fails to
        // serialize; the `expect` documents that rather than threading a
        // `Result` through every call site that only ever sends frames we
        // constructed ourselves.
        serde_json::to_string(&OutboundEnvelope { event, data })
            .expect("outbound envelope is always representable as JSON")
    }
}
