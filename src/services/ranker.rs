use std::collections::BTreeSet;

use crate::models::CandidateItem;

/// Candidates partitioned by genre match against the session criteria
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieredPool {
    /// Carries every requested genre
    pub tier1: Vec<CandidateItem>,
    /// Carries some requested genre
    pub tier2: Vec<CandidateItem>,
    /// Carries none of them
    pub tier3: Vec<CandidateItem>,
}

impl TieredPool {
    pub fn len(&self) -> usize {
        self.tier1.len() + self.tier2.len() + self.tier3.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partitions `items` into tiers. With no requested genres every item is
/// tier 1. Order inside a tier is not meaningful.
pub fn rank(items: Vec<CandidateItem>, requested: &BTreeSet<u32>) -> TieredPool {
    let mut pool = TieredPool::default();

    if requested.is_empty() {
        pool.tier1 = items;
        return pool;
    }

    for item in items {
        if requested.is_subset(&item.genre_ids) {
            pool.tier1.push(item);
        } else if !requested.is_disjoint(&item.genre_ids) {
            pool.tier2.push(item);
        } else {
            pool.tier3.push(item);
        }
    }

    tracing::debug!(
        tier1 = pool.tier1.len(),
        tier2 = pool.tier2.len(),
        tier3 = pool.tier3.len(),
        "Candidates ranked"
    );

    pool
}
