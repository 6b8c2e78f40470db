//! `ServerState`: the process-wide singleton.
//!
//! Two pieces, deliberately kept apart:
//! - `core`, a single `tokio::sync::Mutex<CoreState>` guarding the Waiting
//!   Pool, Pair Registry, and per-client session/interest bookkeeping —
//!   the one critical section in the whole server.
//! - `senders`, a lock-free concurrent map from client id to that
//!   connection's egress channel, so delivering an event to a client never
//!   needs the matchmaking lock held.

use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::config::ServerConfig;
use crate::interests::InterestList;
use crate::protocol::ServerEvent;
use crate::session::{ClientId, CoreState};

pub type Egress = mpsc::UnboundedSender<ServerEvent>;

pub struct ServerState {
    core: Mutex<CoreState>,
    senders: DashMap<ClientId, Egress>,
    start: Instant,
    pub config: ServerConfig,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        ServerState {
            core: Mutex::new(CoreState::new()),
            senders: DashMap::new(),
            start: Instant::now(),
            config,
        }
    }

    fn now_nanos(&self) -> u128 {
        self.start.elapsed().as_nanos()
    }

    /// Connection Supervisor: register a freshly connected client and its
    /// egress channel.
    pub async fn connect(&self, id: ClientId, tx: Egress) {
        self.core.lock().await.connect(id.clone());
        self.senders.insert(id, tx);
    }

    /// Tear down `id` and deliver any resulting notifications.
    pub async fn disconnect(&self, id: &ClientId) {
        let emissions = self.core.lock().await.disconnect(id);
        self.deliver(emissions);
        self.senders.remove(id);
    }

    pub async fn find_partner(&self, id: &ClientId, interests: InterestList) {
        let now = self.now_nanos();
        let emissions = self.core.lock().await.find_partner(id, interests, now);
        self.deliver(emissions);
    }

    pub async fn send_message(&self, id: &ClientId, text: String) {
        let emissions = self.core.lock().await.send_message(id, text);
        self.deliver(emissions);
    }

    pub async fn offer(&self, id: &ClientId, payload: serde_json::Value) {
        let emissions = self.core.lock().await.offer(id, payload);
        self.deliver(emissions);
    }

    pub async fn answer(&self, id: &ClientId, to: ClientId, payload: serde_json::Value) {
        let emissions = self.core.lock().await.answer(id, to, payload);
        self.deliver(emissions);
    }

    pub async fn ice_candidate(&self, id: &ClientId, payload: serde_json::Value) {
        let emissions = self.core.lock().await.ice_candidate(id, payload);
        self.deliver(emissions);
    }

    pub async fn stop_video(&self, id: &ClientId) {
        let emissions = self.core.lock().await.stop_video(id);
        self.deliver(emissions);
    }

    pub async fn skip(&self, id: &ClientId, interests: Option<InterestList>) {
        let now = self.now_nanos();
        let emissions = self.core.lock().await.skip(id, interests, now);
        self.deliver(emissions);
    }

    pub async fn leave_chat(&self, id: &ClientId) {
        let emissions = self.core.lock().await.leave_chat(id);
        self.deliver(emissions);
    }

    fn deliver(&self, emissions: Vec<(ClientId, ServerEvent)>) {
        for (target, event) in emissions {
            self.send_to(&target, event);
        }
    }

    /// Non-blocking: `UnboundedSender::send` never awaits. A closed
    /// channel means that connection's own supervisor task is already
    /// tearing it down (or about to), so a failed delivery here is just
    /// logged, not retried.
    fn send_to(&self, id: &ClientId, event: ServerEvent) {
        match self.senders.get(id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!(client_id = %id, "egress channel closed, dropping emission");
                }
            }
            None => warn!(client_id = %id, "no egress channel for client, dropping emission"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interests::{normalize, RawInterests};

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: vec!["127.0.0.1".to_string()],
            port: 0,
            dev_mode: true,
            trace: false,
            limit_message_length: 16384,
        }
    }

    fn interests(s: &str) -> InterestList {
        normalize(RawInterests::Single(s.to_string()))
    }

    #[tokio::test]
    async fn pairing_delivers_partner_found_through_the_egress_channels() {
        let state = ServerState::new(test_config());
        let a = ClientId::from("a".to_string());
        let b = ClientId::from("b".to_string());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.connect(a.clone(), tx_a).await;
        state.connect(b.clone(), tx_b).await;

        state.find_partner(&a, interests("music")).await;
        assert!(matches!(rx_a.recv().await.unwrap(), ServerEvent::Waiting(_)));

        state.find_partner(&b, interests("music")).await;
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerEvent::PartnerFound(_)
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::PartnerFound(_)
        ));
    }

    #[tokio::test]
    async fn disconnect_notifies_the_remaining_partner() {
        let state = ServerState::new(test_config());
        let a = ClientId::from("a".to_string());
        let b = ClientId::from("b".to_string());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.connect(a.clone(), tx_a).await;
        state.connect(b.clone(), tx_b).await;

        state.find_partner(&a, interests("random")).await;
        state.find_partner(&b, interests("random")).await;
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        state.disconnect(&a).await;
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerEvent::PartnerDisconnected
        ));
    }
}
