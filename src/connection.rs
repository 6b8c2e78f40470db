//! Maps transport connect/disconnect onto core state transitions: a read
//! half driven by inbound frames and a write half driven by an egress
//! channel, so a slow reader never blocks delivery to other clients.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::select;
use tracing::{debug, error, info};

use crate::protocol::ClientEvent;
use crate::session::ClientId;
use crate::state::ServerState;
use crate::transport::{Inbound, MessageIO};

pub async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    addr: SocketAddr,
    mut running: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let client_id = ClientId::new_random();
    info!(%addr, client_id = %client_id, "connected");

    let mut io = MessageIO::new(ws, state.config.limit_message_length);
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.connect(client_id.clone(), tx).await;

    loop {
        select! {
            inbound = io.get() => {
                match inbound {
                    Ok(Some(Inbound::Event(event))) => {
                        dispatch(&state, &client_id, event).await;
                    }
                    Ok(Some(Inbound::Dropped)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        error!(client_id = %client_id, error = %e, "transport read error");
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        if let Err(e) = io.put(event).await {
                            error!(client_id = %client_id, error = %e, "transport write error");
                            break;
                        }
                        if let Err(e) = io.flush().await {
                            error!(client_id = %client_id, error = %e, "transport flush error");
                            break;
                        }
                    }
                    None => break,
                }
            }
            result = running.changed() => {
                if result.is_err() || !*running.borrow() {
                    break;
                }
            }
        }
    }

    state.disconnect(&client_id).await;
    let _ = io.close().await;
    info!(%addr, client_id = %client_id, "disconnected");
}

async fn dispatch(state: &Arc<ServerState>, client_id: &ClientId, event: ClientEvent) {
    match event {
        ClientEvent::FindPartner(raw) => {
            state.find_partner(client_id, crate::interests::normalize(raw)).await;
        }
        ClientEvent::SendMessage { text } => state.send_message(client_id, text).await,
        ClientEvent::Offer { offer } => state.offer(client_id, offer).await,
        ClientEvent::Answer { to, answer } => state.answer(client_id, to, answer).await,
        ClientEvent::IceCandidate { candidate } => state.ice_candidate(client_id, candidate).await,
        ClientEvent::StopVideo => state.stop_video(client_id).await,
        ClientEvent::Skip(raw) => {
            state.skip(client_id, raw.map(crate::interests::normalize)).await;
        }
        ClientEvent::LeaveChat => state.leave_chat(client_id).await,
    }
}
