//! Canonicalizes whatever a client sent as `find_partner`/`skip` interests
//! into an ordered, deduplicated list of lowercase tags. Pure, infallible.

use serde::{Deserialize, Serialize};

pub const RANDOM: &str = "random";

/// Either a single (possibly comma-separated) string or an already-split
/// list, matching the two shapes `find_partner` is allowed to carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInterests {
    Single(String),
    List(Vec<String>),
}

impl Default for RawInterests {
    fn default() -> Self {
        RawInterests::Single(String::new())
    }
}

/// An ordered, deduplicated, non-empty list of interest tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterestList(Vec<String>);

impl InterestList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains_random(&self) -> bool {
        self.0.iter().any(|tag| tag == RANDOM)
    }

    fn random() -> Self {
        InterestList(vec![RANDOM.to_string()])
    }

    fn dedup_preserving_order(tags: Vec<String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(tags.len());
        for tag in tags {
            if seen.insert(tag.clone()) {
                out.push(tag);
            }
        }
        if out.is_empty() {
            InterestList::random()
        } else {
            InterestList(out)
        }
    }
}

/// Normalizes raw client input into a canonical interest list.
pub fn normalize(input: RawInterests) -> InterestList {
    match input {
        RawInterests::List(entries) => {
            let tags: Vec<String> = entries
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            InterestList::dedup_preserving_order(tags)
        }
        RawInterests::Single(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(RANDOM) {
                return InterestList::random();
            }
            let tags: Vec<String> = trimmed
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            InterestList::dedup_preserving_order(tags)
        }
    }
}
