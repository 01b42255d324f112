#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use curator_api::{
    db::InMemorySessionStore,
    error::{AppError, AppResult},
    models::MediaKind,
    services::{
        CatalogFetcher, CatalogProvider, ContentPipeline, ContentSetService, CurationSettings,
        FilterPipeline, RandomSource, StaticFallback,
    },
};

const PAGE_SIZE: usize = 20;

/// Catalog serving a fixed record list, twenty records per page
pub struct FixtureCatalog {
    records: Vec<Value>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl FixtureCatalog {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CatalogProvider for FixtureCatalog {
    async fn discover(
        &self,
        _media_kind: MediaKind,
        _genre_ids: &BTreeSet<u32>,
        page: u32,
    ) -> AppResult<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("fixture catalog unavailable".to_string()));
        }

        let start = (page as usize - 1) * PAGE_SIZE;
        Ok(self
            .records
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn details(&self, _media_kind: MediaKind, id: u64) -> AppResult<Value> {
        self.records
            .iter()
            .find(|record| record["id"] == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("title {}", id)))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

pub fn record(id: u64, genres: &[u32], language: &str, overview: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Title {}", id),
        "overview": overview,
        "release_date": "2015-05-15",
        "original_language": language,
        "genre_ids": genres,
        "popularity": 12.5,
        "vote_average": 7.1,
        "vote_count": 420,
        "poster_path": format!("/poster-{}.jpg", id)
    })
}

/// `count` compliant records with the given genres, ids starting at `first_id`
pub fn compliant(first_id: u64, count: u64, genres: &[u32]) -> Vec<Value> {
    (first_id..first_id + count)
        .map(|id| record(id, genres, "en", "A synopsis"))
        .collect()
}

/// 150 unique records: 40 carry both 28 and 12, 40 carry only 28, and 70
/// fail a content rule (35 in Hindi, 35 without a synopsis)
pub fn scenario_a_records() -> Vec<Value> {
    let mut records = compliant(1, 40, &[28, 12, 878]);
    records.extend(compliant(101, 40, &[28]));
    records.extend((201..236).map(|id| record(id, &[28, 12], "hi", "A synopsis")));
    records.extend((301..336).map(|id| record(id, &[28, 12], "en", "  ")));
    records
}

pub fn build_service(
    catalog: Arc<FixtureCatalog>,
    content_set_size: u32,
    seed: u64,
) -> ContentSetService {
    build_service_with(catalog, content_set_size, RandomSource::Seeded(seed))
}

pub fn build_service_with(
    catalog: Arc<FixtureCatalog>,
    content_set_size: u32,
    random_source: RandomSource,
) -> ContentSetService {
    ContentSetService::new(
        Arc::new(InMemorySessionStore::new()),
        ContentPipeline::new(
            CatalogFetcher::new(catalog, 4, Duration::from_secs(2), 10),
            FilterPipeline::default(),
            random_source,
        ),
        Arc::new(StaticFallback::new()),
        CurationSettings {
            content_set_size,
            build_wait: Duration::from_secs(5),
        },
    )
}
