use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{CandidateItem, SequencedItem},
    services::ranker::TieredPool,
};

/// Where shuffle randomness comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RandomSource {
    /// Fresh OS-seeded generator per build
    #[default]
    Entropy,
    /// Same seed, same permutation of the same pool
    Seeded(u64),
}

impl RandomSource {
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or(RandomSource::Entropy, RandomSource::Seeded)
    }

    pub fn rng(&self) -> StdRng {
        match self {
            RandomSource::Entropy => StdRng::from_entropy(),
            RandomSource::Seeded(seed) => StdRng::seed_from_u64(*seed),
        }
    }
}

/// The catalog could not supply the requested number of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupplyShortfall {
    pub requested: u32,
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub items: Vec<CandidateItem>,
    pub shortfall: Option<SupplyShortfall>,
}

impl Selection {
    /// Assigns sequence indices `0..len` in selection order
    pub fn into_sequenced(self) -> Vec<SequencedItem> {
        self.items
            .into_iter()
            .enumerate()
            .map(|(index, item)| SequencedItem {
                sequence_index: index as u32,
                item,
            })
            .collect()
    }
}

/// Shuffles each tier independently and fills `target` slots from tier 1,
/// then tier 2, then tier 3.
pub fn select<R: Rng + ?Sized>(
    pool: TieredPool,
    target: u32,
    rng: &mut R,
) -> AppResult<Selection> {
    if target == 0 {
        return Err(AppError::BusinessRule(
            "content set size must be positive".to_string(),
        ));
    }

    let available = pool.len() as u32;
    let TieredPool {
        mut tier1,
        mut tier2,
        mut tier3,
    } = pool;

    tier1.shuffle(rng);
    tier2.shuffle(rng);
    tier3.shuffle(rng);

    let items: Vec<CandidateItem> = tier1
        .into_iter()
        .chain(tier2)
        .chain(tier3)
        .take(target as usize)
        .collect();

    if available < target {
        tracing::warn!(
            requested = target,
            available,
            "Catalog supply short of requested content set size"
        );
        return Ok(Selection {
            items,
            shortfall: Some(SupplyShortfall {
                requested: target,
                available,
            }),
        });
    }

    if items.len() != target as usize {
        return Err(AppError::BusinessRule(format!(
            "selected {} items, expected exactly {}",
            items.len(),
            target
        )));
    }

    Ok(Selection {
        items,
        shortfall: None,
    })
}
