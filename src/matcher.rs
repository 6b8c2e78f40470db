//! Picks the best waiting partner for a candidate.

use crate::interests::InterestList;
use crate::pool::{WaitingEntry, WaitingPool};
use crate::session::ClientId;

/// Maximizes interest overlap; ties break on smaller `joined_at_nanos`
/// (FIFO).
pub fn find_best_match(
    candidate_interests: &InterestList,
    exclude_id: &ClientId,
    pool: &WaitingPool,
) -> Option<WaitingEntry> {
    let candidate_random = candidate_interests.contains_random();

    let mut best: Option<(usize, &WaitingEntry)> = None;
    for entry in pool.iter() {
        if &entry.client_id == exclude_id {
            continue;
        }
        let common = common_count(candidate_interests, &entry.interests);
        let both_random = candidate_random && entry.interests.contains_random();
        if common == 0 && !both_random {
            continue;
        }
        match &best {
            None => best = Some((common, entry)),
            Some((best_common, best_entry)) => {
                let better = common > *best_common
                    || (common == *best_common
                        && entry.joined_at_nanos < best_entry.joined_at_nanos);
                if better {
                    best = Some((common, entry));
                }
            }
        }
    }
    best.map(|(_, entry)| entry.clone())
}

fn common_count(a: &InterestList, b: &InterestList) -> usize {
    let b_set: std::collections::HashSet<&String> = b.as_slice().iter().collect();
    a.as_slice().iter().filter(|tag| b_set.contains(tag)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interests::{normalize, RawInterests};
    use crate::pool::WaitingEntry;

    fn cid(s: &str) -> ClientId {
        ClientId::from(s.to_string())
    }

    fn interests(s: &str) -> InterestList {
        normalize(RawInterests::Single(s.to_string()))
    }

    fn entry(id: &str, tags: &str, t: u128) -> WaitingEntry {
        WaitingEntry {
            client_id: cid(id),
            interests: interests(tags),
            joined_at_nanos: t,
        }
    }

    #[test]
    fn best_match_wins_over_fifo() {
        let mut pool = WaitingPool::new();
        pool.insert(entry("x", "music", 1));
        pool.insert(entry("y", "music,movies", 2));
        let c = interests("music,movies");
        let m = find_best_match(&c, &cid("c"), &pool).unwrap();
        assert_eq!(m.client_id, cid("y"));
    }

    #[test]
    fn fifo_tie_break() {
        let mut pool = WaitingPool::new();
        pool.insert(entry("x", "music", 1));
        pool.insert(entry("y", "music", 2));
        let c = interests("music");
        let m = find_best_match(&c, &cid("c"), &pool).unwrap();
        assert_eq!(m.client_id, cid("x"));
    }

    #[test]
    fn strict_random_semantics() {
        let mut pool = WaitingPool::new();
        pool.insert(entry("x", "music", 1));
        let c = interests("");
        assert!(find_best_match(&c, &cid("c"), &pool).is_none());

        pool.insert(entry("c", "random", 2));
        let d = interests("random");
        let m = find_best_match(&d, &cid("d"), &pool).unwrap();
        assert_eq!(m.client_id, cid("c"));
    }

    #[test]
    fn excludes_self() {
        let mut pool = WaitingPool::new();
        pool.insert(entry("a", "music", 1));
        let c = interests("music");
        assert!(find_best_match(&c, &cid("a"), &pool).is_none());
    }
}
