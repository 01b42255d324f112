/// TMDB v3 catalog provider
///
/// Discovery: /discover/{movie|tv} sorted by popularity, genres OR-joined
/// Details:   /{movie|tv}/{id}
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::MediaKind,
    services::providers::CatalogProvider,
};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

const PAGE_CACHE_TTL: u64 = 3600; // 1 hour
const DETAILS_CACHE_TTL: u64 = 86400; // 1 day

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Option<Cache>,
}

impl TmdbCatalog {
    /// `request_timeout` bounds each HTTP call; `cache` enables read-through
    /// caching of raw responses.
    pub fn new(
        api_key: String,
        api_url: String,
        request_timeout: Duration,
        cache: Option<Cache>,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn request(&self, path: &str, query: &[(&str, String)]) -> AppResult<Value> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn cached_request(
        &self,
        key: CacheKey,
        ttl: u64,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<Value> {
        match &self.cache {
            Some(cache) => cached!(cache, key, ttl, self.request(path, query)),
            None => self.request(path, query).await,
        }
    }
}

/// Pipe-joined genre list, the OR form of `with_genres`
fn genre_filter(genre_ids: &BTreeSet<u32>) -> String {
    genre_ids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbCatalog {
    async fn discover(
        &self,
        media_kind: MediaKind,
        genre_ids: &BTreeSet<u32>,
        page: u32,
    ) -> AppResult<Vec<Value>> {
        let genres = genre_filter(genre_ids);
        let path = format!("/discover/{}", media_kind);

        let mut query = vec![
            ("page", page.to_string()),
            ("sort_by", "popularity.desc".to_string()),
            ("include_adult", "false".to_string()),
        ];
        if !genres.is_empty() {
            query.push(("with_genres", genres.clone()));
        }

        let key = CacheKey::DiscoverPage {
            media: media_kind,
            genres,
            page,
        };
        let body = self
            .cached_request(key, PAGE_CACHE_TTL, &path, &query)
            .await?;

        let results = body["results"].as_array().cloned().ok_or_else(|| {
            AppError::Upstream("Invalid TMDB discover response format".to_string())
        })?;

        tracing::debug!(
            media_kind = %media_kind,
            page,
            results = results.len(),
            "TMDB discover page fetched"
        );

        Ok(results)
    }

    async fn details(&self, media_kind: MediaKind, id: u64) -> AppResult<Value> {
        let path = format!("/{}/{}", media_kind, id);
        let key = CacheKey::Details {
            media: media_kind,
            id,
        };
        self.cached_request(key, DETAILS_CACHE_TTL, &path, &[]).await
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
