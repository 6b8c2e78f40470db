//! A symmetric map of currently paired clients.

use std::collections::HashMap;

use crate::session::ClientId;

#[derive(Debug, Default)]
pub struct PairRegistry {
    pairs: HashMap<ClientId, ClientId>,
}

impl PairRegistry {
    pub fn new() -> Self {
        PairRegistry {
            pairs: HashMap::new(),
        }
    }

    /// Requires neither `a` nor `b` is currently bound. Installs `a<->b`.
    pub fn bind(&mut self, a: ClientId, b: ClientId) {
        debug_assert!(!self.pairs.contains_key(&a), "{a:?} already bound");
        debug_assert!(!self.pairs.contains_key(&b), "{b:?} already bound");
        self.pairs.insert(a.clone(), b.clone());
        self.pairs.insert(b, a);
    }

    pub fn partner_of(&self, id: &ClientId) -> Option<ClientId> {
        self.pairs.get(id).cloned()
    }

    /// Removes both sides of the binding containing `id`, if any. Returns
    /// the former partner.
    pub fn unbind(&mut self, id: &ClientId) -> Option<ClientId> {
        let partner = self.pairs.remove(id)?;
        self.pairs.remove(&partner);
        Some(partner)
    }
}
