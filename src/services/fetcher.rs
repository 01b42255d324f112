use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{CandidateItem, FilterCriteria, MediaKind},
    services::providers::{ingest, CatalogProvider, PAGE_SIZE},
};

/// Over-fetch factor applied to the target count before filtering
const OVERFETCH_FACTOR: u32 = 3;

/// Bounded, parallel page fan-out against a [`CatalogProvider`]
pub struct CatalogFetcher {
    catalog: Arc<dyn CatalogProvider>,
    concurrency: usize,
    page_timeout: Duration,
    max_pages: u32,
}

impl CatalogFetcher {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        concurrency: usize,
        page_timeout: Duration,
        max_pages: u32,
    ) -> Self {
        Self {
            catalog,
            concurrency: concurrency.max(1),
            page_timeout,
            max_pages: max_pages.max(1),
        }
    }

    /// Pages needed to gather roughly three times `target` raw records
    pub fn pages_for(target: u32, max_pages: u32) -> u32 {
        target
            .saturating_mul(OVERFETCH_FACTOR)
            .div_ceil(PAGE_SIZE)
            .clamp(1, max_pages.max(1))
    }

    /// Fetches, normalizes and deduplicates candidates for `criteria`.
    ///
    /// A failed or timed-out page is dropped; the call fails only when every
    /// page fails. Discovery matches any requested genre, so when it comes
    /// back with fewer than `target` records, unfiltered pages are appended
    /// as backfill for the lowest tier. Output order follows page order, so
    /// the result is stable for a given catalog response.
    pub async fn fetch(
        &self,
        criteria: &FilterCriteria,
        target: u32,
    ) -> AppResult<Vec<CandidateItem>> {
        let media_kind = criteria.media_kind();
        let genre_ids = criteria.genre_ids();
        let pages = Self::pages_for(target, self.max_pages);

        let (mut raw_records, failed_pages) = self.fetch_pages(media_kind, genre_ids, pages).await;
        if failed_pages == pages {
            return Err(AppError::Upstream(format!(
                "all {} catalog pages failed for {}",
                pages, media_kind
            )));
        }

        let short_by = target.saturating_sub(raw_records.len() as u32);
        if !genre_ids.is_empty() && short_by > 0 {
            let backfill_pages = Self::pages_for(short_by, self.max_pages);
            let (backfill, _) = self
                .fetch_pages(media_kind, &BTreeSet::new(), backfill_pages)
                .await;
            tracing::debug!(
                provider = self.catalog.name(),
                short_by,
                backfill_pages,
                backfill_records = backfill.len(),
                "Genre discovery short; fetched unfiltered backfill"
            );
            raw_records.extend(backfill);
        }

        let raw_count = raw_records.len();
        let mut rejected = 0usize;
        let mut candidates: Vec<CandidateItem> = Vec::with_capacity(raw_count);
        let mut positions: HashMap<u64, usize> = HashMap::with_capacity(raw_count);

        for raw in &raw_records {
            let item = match ingest::normalize(raw, media_kind) {
                Ok(item) => item,
                Err(reason) => {
                    rejected += 1;
                    tracing::debug!(reason = %reason, "Catalog record rejected");
                    continue;
                }
            };

            match positions.get(&item.id) {
                Some(&position) => {
                    if item.completeness() > candidates[position].completeness() {
                        candidates[position] = item;
                    }
                }
                None => {
                    positions.insert(item.id, candidates.len());
                    candidates.push(item);
                }
            }
        }

        tracing::info!(
            provider = self.catalog.name(),
            media_kind = %media_kind,
            pages,
            failed_pages,
            raw_records = raw_count,
            rejected,
            candidates = candidates.len(),
            "Catalog fetch complete"
        );

        Ok(candidates)
    }

    /// Requests pages `1..=pages` concurrently; returns records in page order
    /// and the number of pages that failed
    async fn fetch_pages(
        &self,
        media_kind: MediaKind,
        genre_ids: &BTreeSet<u32>,
        pages: u32,
    ) -> (Vec<Value>, u32) {
        let mut outcomes: Vec<(u32, AppResult<Vec<Value>>)> = stream::iter(1..=pages)
            .map(|page| async move {
                let outcome = match tokio::time::timeout(
                    self.page_timeout,
                    self.catalog.discover(media_kind, genre_ids, page),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Upstream(format!(
                        "page {} timed out after {}ms",
                        page,
                        self.page_timeout.as_millis()
                    ))),
                };
                (page, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(page, _)| *page);

        let mut records = Vec::new();
        let mut failed_pages = 0u32;
        for (page, outcome) in outcomes {
            match outcome {
                Ok(page_records) => records.extend(page_records),
                Err(e) => {
                    failed_pages += 1;
                    tracing::warn!(
                        provider = self.catalog.name(),
                        page,
                        error = %e,
                        "Catalog page dropped"
                    );
                }
            }
        }

        (records, failed_pages)
    }
}
