use serde_json::{json, Value};
use std::sync::Arc;

use super::{ingest, CatalogProvider};
use crate::{
    error::AppResult,
    models::{CandidateItem, MediaKind},
};

/// Source of candidates for a session that has no prebuilt content set.
/// Fallback candidates are served as-is and never written to the store.
#[async_trait::async_trait]
pub trait FallbackProvider: Send + Sync {
    async fn candidates(&self, media_kind: MediaKind) -> AppResult<Vec<CandidateItem>>;

    fn name(&self) -> &'static str;
}

/// A fixed list of widely known films.
///
/// Has no series; asking it for TV yields nothing.
pub struct StaticFallback {
    items: Vec<CandidateItem>,
}

impl StaticFallback {
    pub fn new() -> Self {
        let items = default_records()
            .iter()
            .filter_map(|raw| ingest::normalize(raw, MediaKind::Movie).ok())
            .collect();
        Self { items }
    }
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new()
    }
}

fn default_records() -> [Value; 5] {
    [
        json!({
            "id": 550,
            "title": "Fight Club",
            "overview": "A sleepless office worker and a reckless soap salesman start an underground fight club that grows into something far more dangerous.",
            "release_date": "1999-10-15",
            "original_language": "en",
            "vote_average": 8.4,
            "poster_path": "/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg",
            "genre_ids": [18]
        }),
        json!({
            "id": 13,
            "title": "Forrest Gump",
            "overview": "A kind-hearted man from Alabama drifts through decades of American history while never losing sight of the woman he loves.",
            "release_date": "1994-06-23",
            "original_language": "en",
            "vote_average": 8.5,
            "poster_path": "/arw2vcBveWOVZr6pxd9XTd1TdQa.jpg",
            "genre_ids": [35, 18, 10749]
        }),
        json!({
            "id": 278,
            "title": "The Shawshank Redemption",
            "overview": "Two prisoners form a lasting friendship over years behind bars and find hope through small acts of decency.",
            "release_date": "1994-09-23",
            "original_language": "en",
            "vote_average": 9.3,
            "poster_path": "/q6y0Go1tsGEsmtFryDOJo3dEmqu.jpg",
            "genre_ids": [18, 80]
        }),
        json!({
            "id": 238,
            "title": "The Godfather",
            "overview": "The ageing head of a crime family hands his empire to his reluctant youngest son.",
            "release_date": "1972-03-14",
            "original_language": "en",
            "vote_average": 9.2,
            "poster_path": "/3bhkrj58Vtu7enYsRolD1fZdja1.jpg",
            "genre_ids": [18, 80]
        }),
        json!({
            "id": 424,
            "title": "Schindler's List",
            "overview": "In occupied Poland, an industrialist slowly turns his factory into a refuge for his Jewish workers.",
            "release_date": "1993-11-30",
            "original_language": "en",
            "vote_average": 9.0,
            "poster_path": "/sF1U4EUQS8YHUYjNl3pMGNIQyr0.jpg",
            "genre_ids": [18, 36, 10752]
        }),
    ]
}

#[async_trait::async_trait]
impl FallbackProvider for StaticFallback {
    async fn candidates(&self, media_kind: MediaKind) -> AppResult<Vec<CandidateItem>> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.media_kind == media_kind)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Hydrates a configured id list through the catalog's detail lookup.
/// Ids that fail to load or normalize are skipped.
pub struct CatalogFallback {
    catalog: Arc<dyn CatalogProvider>,
    ids: Vec<u64>,
}

impl CatalogFallback {
    pub fn new(catalog: Arc<dyn CatalogProvider>, ids: Vec<u64>) -> Self {
        Self { catalog, ids }
    }
}

#[async_trait::async_trait]
impl FallbackProvider for CatalogFallback {
    async fn candidates(&self, media_kind: MediaKind) -> AppResult<Vec<CandidateItem>> {
        let mut items = Vec::with_capacity(self.ids.len());

        for id in &self.ids {
            let raw = match self.catalog.details(media_kind, *id).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(id, error = %e, "Fallback title lookup failed");
                    continue;
                }
            };

            match ingest::normalize(&raw, media_kind) {
                Ok(item) => items.push(item),
                Err(e) => tracing::debug!(id, reason = %e, "Fallback record rejected"),
            }
        }

        Ok(items)
    }

    fn name(&self) -> &'static str {
        "catalog"
    }
}
