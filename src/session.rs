//! Per-client lifecycle and event dispatch.
//!
//! [`CoreState`] is the single critical section: the Waiting Pool, Pair
//! Registry, and per-client interests/session state all live here, mutated
//! only through the methods below. Every method is a plain, synchronous
//! state transition that returns the list of `(recipient, event)` emissions
//! it caused; nothing in this file does I/O, which is what makes the state
//! machine directly testable and keeps the critical section free of
//! anything that could block or await while held.

use serde_json::Value;

use crate::interests::InterestList;
use crate::matcher::find_best_match;
use crate::pool::{WaitingEntry, WaitingPool};
use crate::protocol::{Sender, ServerEvent};
use crate::registry::PairRegistry;

/// Opaque per-connection identity. Cheap to clone; compared/hashed as a
/// plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn new_random() -> Self {
        ClientId(uuid::Uuid::new_v4().to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        ClientId(s)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The states a connected client moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Waiting,
    Paired,
    Closed,
}

#[derive(Debug, Clone)]
struct ClientRecord {
    state: SessionState,
    /// Remembered across pairings so a bare `skip` can reuse it. Cleared
    /// only by `leave_chat`.
    interests: Option<InterestList>,
}

impl Default for ClientRecord {
    fn default() -> Self {
        ClientRecord {
            state: SessionState::Unregistered,
            interests: None,
        }
    }
}

type Emissions = Vec<(ClientId, ServerEvent)>;

#[derive(Debug, Default)]
pub struct CoreState {
    pool: WaitingPool,
    registry: PairRegistry,
    clients: std::collections::HashMap<ClientId, ClientRecord>,
}

impl CoreState {
    pub fn new() -> Self {
        CoreState::default()
    }

    #[cfg(test)]
    pub fn session_state_of(&self, id: &ClientId) -> Option<SessionState> {
        self.clients.get(id).map(|r| r.state)
    }

    #[cfg(test)]
    pub fn is_waiting(&self, id: &ClientId) -> bool {
        self.pool.contains(id)
    }

    #[cfg(test)]
    pub fn partner_of(&self, id: &ClientId) -> Option<ClientId> {
        self.registry.partner_of(id)
    }

    /// Allocate bookkeeping for a freshly connected client.
    pub fn connect(&mut self, id: ClientId) {
        self.clients.insert(id, ClientRecord::default());
    }

    /// Tear down every trace of `id`: waiting-pool entry, pairing, and
    /// per-client record.
    pub fn disconnect(&mut self, id: &ClientId) -> Emissions {
        let mut emissions = Emissions::new();
        self.pool.remove_by_id(id);
        if let Some(partner) = self.registry.unbind(id) {
            self.set_state(&partner, SessionState::Unregistered);
            emissions.push((partner, ServerEvent::PartnerDisconnected));
        }
        self.clients.remove(id);
        emissions
    }

    /// Valid from any state: drop any existing pairing, then look for or
    /// wait for a new one.
    pub fn find_partner(
        &mut self,
        id: &ClientId,
        interests: InterestList,
        now_nanos: u128,
    ) -> Emissions {
        let mut emissions = Emissions::new();
        if self.state_of(id) == SessionState::Paired {
            if let Some(partner) = self.registry.unbind(id) {
                self.set_state(&partner, SessionState::Unregistered);
                emissions.push((partner, ServerEvent::PartnerDisconnected));
            }
        }
        self.pool.remove_by_id(id);
        self.remember_interests(id, interests.clone());
        emissions.extend(self.seek_partner(id, &interests, now_nanos));
        emissions
    }

    /// Shared by `find_partner` and the re-match half of `skip`: looks for
    /// a waiting candidate and either pairs or enqueues.
    fn seek_partner(
        &mut self,
        id: &ClientId,
        interests: &InterestList,
        now_nanos: u128,
    ) -> Emissions {
        match find_best_match(interests, id, &self.pool) {
            Some(partner_entry) => {
                self.pool.remove_by_id(&partner_entry.client_id);
                self.registry.bind(id.clone(), partner_entry.client_id.clone());
                self.set_state(id, SessionState::Paired);
                self.set_state(&partner_entry.client_id, SessionState::Paired);
                vec![
                    (id.clone(), ServerEvent::PartnerFound(partner_entry.client_id.clone())),
                    (partner_entry.client_id, ServerEvent::PartnerFound(id.clone())),
                ]
            }
            None => {
                self.pool.insert(WaitingEntry {
                    client_id: id.clone(),
                    interests: interests.clone(),
                    joined_at_nanos: now_nanos,
                });
                self.set_state(id, SessionState::Waiting);
                vec![(id.clone(), ServerEvent::Waiting(waiting_message(interests)))]
            }
        }
    }

    /// Relays to the partner and echoes back to the sender with its own
    /// sender tag, so both sides see the same message in the same order.
    pub fn send_message(&mut self, id: &ClientId, text: String) -> Emissions {
        if self.state_of(id) != SessionState::Paired {
            return Emissions::new();
        }
        let Some(partner) = self.registry.partner_of(id) else {
            return Emissions::new();
        };
        vec![
            (
                partner,
                ServerEvent::ReceiveMessage {
                    sender: Sender::Partner,
                    text: text.clone(),
                },
            ),
            (
                id.clone(),
                ServerEvent::ReceiveMessage {
                    sender: Sender::Me,
                    text,
                },
            ),
        ]
    }

    /// Opaque relay to the partner.
    pub fn offer(&mut self, id: &ClientId, payload: Value) -> Emissions {
        self.relay_if_paired(id, |from| ServerEvent::Offer { from, offer: payload })
    }

    /// `to` must be the caller's current partner; anything else is dropped.
    pub fn answer(&mut self, id: &ClientId, to: ClientId, payload: Value) -> Emissions {
        if self.state_of(id) != SessionState::Paired {
            return Emissions::new();
        }
        if self.registry.partner_of(id) != Some(to.clone()) {
            return Emissions::new();
        }
        vec![(
            to,
            ServerEvent::Answer {
                from: id.clone(),
                answer: payload,
            },
        )]
    }

    /// Opaque relay.
    pub fn ice_candidate(&mut self, id: &ClientId, payload: Value) -> Emissions {
        self.relay_if_paired(id, |from| ServerEvent::IceCandidate {
            from,
            candidate: payload,
        })
    }

    /// Relay, no state change.
    pub fn stop_video(&mut self, id: &ClientId) -> Emissions {
        self.relay_if_paired(id, |_from| ServerEvent::StopVideo)
    }

    fn relay_if_paired(
        &mut self,
        id: &ClientId,
        make_event: impl FnOnce(ClientId) -> ServerEvent,
    ) -> Emissions {
        if self.state_of(id) != SessionState::Paired {
            return Emissions::new();
        }
        match self.registry.partner_of(id) {
            Some(partner) => vec![(partner, make_event(id.clone()))],
            None => Emissions::new(),
        }
    }

    /// `skip(interests?)`: defined only while paired; tear down the current
    /// pairing, then re-match only the initiator.
    pub fn skip(
        &mut self,
        id: &ClientId,
        interests: Option<InterestList>,
        now_nanos: u128,
    ) -> Emissions {
        if self.state_of(id) != SessionState::Paired {
            return Emissions::new();
        }
        let mut emissions = Emissions::new();
        if let Some(partner) = self.registry.unbind(id) {
            self.set_state(&partner, SessionState::Unregistered);
            emissions.push((partner, ServerEvent::PartnerDisconnected));
        }
        self.pool.remove_by_id(id);
        let interests = interests.unwrap_or_else(|| self.recall_interests(id));
        self.remember_interests(id, interests.clone());
        emissions.extend(self.seek_partner(id, &interests, now_nanos));
        emissions
    }

    /// Tear down any pairing, forget remembered interests, and return to
    /// `Unregistered`.
    pub fn leave_chat(&mut self, id: &ClientId) -> Emissions {
        let mut emissions = Emissions::new();
        self.pool.remove_by_id(id);
        if let Some(partner) = self.registry.unbind(id) {
            self.set_state(&partner, SessionState::Unregistered);
            emissions.push((partner, ServerEvent::PartnerDisconnected));
        }
        self.forget_interests(id);
        self.set_state(id, SessionState::Unregistered);
        emissions
    }

    fn state_of(&self, id: &ClientId) -> SessionState {
        self.clients
            .get(id)
            .map(|r| r.state)
            .unwrap_or(SessionState::Closed)
    }

    fn set_state(&mut self, id: &ClientId, state: SessionState) {
        self.clients.entry(id.clone()).or_default().state = state;
    }

    fn remember_interests(&mut self, id: &ClientId, interests: InterestList) {
        self.clients.entry(id.clone()).or_default().interests = Some(interests);
    }

    fn recall_interests(&self, id: &ClientId) -> InterestList {
        self.clients
            .get(id)
            .and_then(|r| r.interests.clone())
            .unwrap_or_else(|| {
                crate::interests::normalize(crate::interests::RawInterests::Single(String::new()))
            })
    }

    fn forget_interests(&mut self, id: &ClientId) {
        if let Some(record) = self.clients.get_mut(id) {
            record.interests = None;
        }
    }
}

fn waiting_message(interests: &InterestList) -> String {
    if interests.contains_random() && interests.as_slice().len() == 1 {
        "Looking for someone you can chat with...".to_string()
    } else {
        format!(
            "Looking for someone who likes {}...",
            interests.as_slice().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interests::{normalize, RawInterests};

    fn cid(s: &str) -> ClientId {
        ClientId::from(s.to_string())
    }

    fn tags(s: &str) -> InterestList {
        normalize(RawInterests::Single(s.to_string()))
    }

    #[test]
    fn exact_interest_pair() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));

        let a_emits = core.find_partner(&cid("a"), tags("music"), 1);
        assert!(matches!(a_emits[0].1, ServerEvent::Waiting(_)));
        assert!(core.is_waiting(&cid("a")));

        let b_emits = core.find_partner(&cid("b"), tags("Music"), 2);
        let recipients: Vec<&ClientId> = b_emits.iter().map(|(id, _)| id).collect();
        assert!(recipients.contains(&&cid("a")));
        assert!(recipients.contains(&&cid("b")));
        assert!(!core.is_waiting(&cid("a")));
        assert!(!core.is_waiting(&cid("b")));
        assert_eq!(core.partner_of(&cid("a")), Some(cid("b")));
        assert_eq!(core.partner_of(&cid("b")), Some(cid("a")));
    }

    #[test]
    fn echo_law() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.find_partner(&cid("a"), tags("random"), 1);
        core.find_partner(&cid("b"), tags("random"), 2);

        let emissions = core.send_message(&cid("a"), "hi".to_string());
        assert_eq!(emissions.len(), 2);
        let partner_emit = emissions.iter().find(|(id, _)| id == &cid("b")).unwrap();
        let self_emit = emissions.iter().find(|(id, _)| id == &cid("a")).unwrap();
        match &partner_emit.1 {
            ServerEvent::ReceiveMessage { sender, text } => {
                assert_eq!(*sender, Sender::Partner);
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &self_emit.1 {
            ServerEvent::ReceiveMessage { sender, text } => {
                assert_eq!(*sender, Sender::Me);
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_message_from_unpaired_is_dropped() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        assert!(core.send_message(&cid("a"), "hi".to_string()).is_empty());
    }

    #[test]
    fn skip_rematches_only_initiator() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.find_partner(&cid("a"), tags("random"), 1);
        core.find_partner(&cid("b"), tags("random"), 2);
        assert_eq!(core.partner_of(&cid("a")), Some(cid("b")));

        let emissions = core.skip(&cid("a"), Some(tags("games")), 3);
        // b gets partner_disconnected and is left Unregistered, not requeued.
        assert!(emissions
            .iter()
            .any(|(id, ev)| id == &cid("b") && matches!(ev, ServerEvent::PartnerDisconnected)));
        assert_eq!(
            core.session_state_of(&cid("b")),
            Some(SessionState::Unregistered)
        );
        assert!(!core.is_waiting(&cid("b")));
        // a is re-matched or enqueued, never left dangling.
        assert!(core.is_waiting(&cid("a")) || core.partner_of(&cid("a")).is_some());
    }

    #[test]
    fn skip_without_payload_reuses_remembered_interests() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.find_partner(&cid("a"), tags("music"), 1);
        core.find_partner(&cid("b"), tags("music"), 2);
        core.skip(&cid("a"), None, 3);
        assert_eq!(core.recall_interests(&cid("a")), tags("music"));
    }

    #[test]
    fn skip_while_unpaired_is_dropped() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.find_partner(&cid("a"), tags("music"), 1);
        assert!(core.is_waiting(&cid("a")));

        let emissions = core.skip(&cid("a"), Some(tags("games")), 2);
        assert!(emissions.is_empty());
        // a's waiting-pool entry is untouched: no double-insert, no panic.
        assert!(core.is_waiting(&cid("a")));
        assert_eq!(core.recall_interests(&cid("a")), tags("music"));
    }

    #[test]
    fn leave_chat_forgets_interests_but_skip_does_not() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.find_partner(&cid("a"), tags("music"), 1);
        core.leave_chat(&cid("a"));
        assert_eq!(core.recall_interests(&cid("a")), tags("random"));
        assert_eq!(
            core.session_state_of(&cid("a")),
            Some(SessionState::Unregistered)
        );
    }

    #[test]
    fn disconnect_mid_pair_cleans_up_both_sides() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.find_partner(&cid("a"), tags("random"), 1);
        core.find_partner(&cid("b"), tags("random"), 2);

        let emissions = core.disconnect(&cid("a"));
        assert!(emissions
            .iter()
            .any(|(id, ev)| id == &cid("b") && matches!(ev, ServerEvent::PartnerDisconnected)));
        assert_eq!(core.partner_of(&cid("b")), None);
        assert_eq!(core.session_state_of(&cid("a")), None);
        assert!(!core.is_waiting(&cid("b")));
    }

    #[test]
    fn answer_to_non_partner_is_dropped() {
        let mut core = CoreState::new();
        core.connect(cid("a"));
        core.connect(cid("b"));
        core.connect(cid("mallory"));
        core.find_partner(&cid("a"), tags("random"), 1);
        core.find_partner(&cid("b"), tags("random"), 2);

        let emissions = core.answer(&cid("a"), cid("mallory"), Value::Null);
        assert!(emissions.is_empty());
    }
}
