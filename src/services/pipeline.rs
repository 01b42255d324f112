use crate::{
    error::AppResult,
    models::{FilterCriteria, SequencedItem},
    services::{
        fetcher::CatalogFetcher,
        filters::FilterPipeline,
        ranker,
        selector::{self, RandomSource, SupplyShortfall},
    },
};

/// Output of one build: a contiguous, ordered content set
#[derive(Debug, Clone)]
pub struct BuiltSet {
    pub items: Vec<SequencedItem>,
    pub shortfall: Option<SupplyShortfall>,
}

/// Fetch -> filter -> rank -> select. Reads the catalog, writes nothing.
pub struct ContentPipeline {
    fetcher: CatalogFetcher,
    filters: FilterPipeline,
    random_source: RandomSource,
}

impl ContentPipeline {
    pub fn new(
        fetcher: CatalogFetcher,
        filters: FilterPipeline,
        random_source: RandomSource,
    ) -> Self {
        Self {
            fetcher,
            filters,
            random_source,
        }
    }

    pub async fn build(&self, criteria: &FilterCriteria, target: u32) -> AppResult<BuiltSet> {
        let fetched = self.fetcher.fetch(criteria, target).await?;
        let compliant = self.filters.apply(fetched)?;
        let pool = ranker::rank(compliant, criteria.genre_ids());

        let mut rng = self.random_source.rng();
        let selection = selector::select(pool, target, &mut rng)?;
        let shortfall = selection.shortfall;

        Ok(BuiltSet {
            items: selection.into_sequenced(),
            shortfall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::FilterCriteriaRequest;
    use crate::services::providers::MockCatalogProvider;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn criteria(genres: &[i64]) -> FilterCriteria {
        FilterCriteria::validate(&FilterCriteriaRequest {
            media_type: "movie".to_string(),
            genre_ids: genres.to_vec(),
            capacity: None,
        })
        .unwrap()
    }

    fn pipeline(catalog: MockCatalogProvider, seed: u64) -> ContentPipeline {
        ContentPipeline::new(
            CatalogFetcher::new(Arc::new(catalog), 4, Duration::from_secs(1), 10),
            FilterPipeline::default(),
            RandomSource::Seeded(seed),
        )
    }

    /// 20 records per page; every fifth is in Hindi and every seventh lacks
    /// a synopsis. Genres rotate through [28,12], [28], [35].
    fn catalog() -> MockCatalogProvider {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _, page| {
            Ok((0..20u64)
                .map(|i| {
                    let id = page as u64 * 100 + i;
                    let genres = match id % 3 {
                        0 => json!([28, 12]),
                        1 => json!([28]),
                        _ => json!([35]),
                    };
                    let overview = if id % 7 == 0 { "" } else { "Plot" };
                    let language = if id % 5 == 0 { "hi" } else { "en" };
                    json!({
                        "id": id,
                        "title": format!("Film {}", id),
                        "overview": overview,
                        "original_language": language,
                        "genre_ids": genres
                    })
                })
                .collect())
        });
        catalog.expect_name().return_const("mock");
        catalog
    }

    #[tokio::test]
    async fn test_build_produces_exact_count_of_compliant_items() {
        let built = pipeline(catalog(), 11)
            .build(&criteria(&[28, 12]), 50)
            .await
            .unwrap();

        assert_eq!(built.items.len(), 50);
        assert!(built.shortfall.is_none());
        for (position, sequenced) in built.items.iter().enumerate() {
            assert_eq!(sequenced.sequence_index as usize, position);
            assert_eq!(sequenced.item.original_language, "en");
            assert!(!sequenced.item.overview.is_empty());
        }

        let mut ids: Vec<u64> = built.items.iter().map(|s| s.item.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn test_build_is_reproducible_with_seed() {
        let a = pipeline(catalog(), 5).build(&criteria(&[28]), 30).await.unwrap();
        let b = pipeline(catalog(), 5).build(&criteria(&[28]), 30).await.unwrap();
        assert_eq!(a.items, b.items);
    }

    #[tokio::test]
    async fn test_build_reports_shortfall() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_discover().returning(|_, _, page| {
            Ok(if page == 1 {
                (1..=12u64)
                    .map(|id| json!({"id": id, "title": "T", "overview": "P", "original_language": "fr"}))
                    .collect()
            } else {
                vec![]
            })
        });
        catalog.expect_name().return_const("mock");

        let built = pipeline(catalog, 1).build(&criteria(&[]), 50).await.unwrap();
        assert_eq!(built.items.len(), 12);
        let shortfall = built.shortfall.unwrap();
        assert_eq!((shortfall.requested, shortfall.available), (50, 12));
    }

    #[tokio::test]
    async fn test_build_fails_when_nothing_is_compliant() {
        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_discover()
            .returning(|_, _, _| Ok(vec![json!({"id": 1, "title": "T", "overview": "", "original_language": "en"})]));
        catalog.expect_name().return_const("mock");

        let err = pipeline(catalog, 1).build(&criteria(&[]), 5).await.unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }
}
