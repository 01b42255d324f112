//! Catalog provider abstraction
//!
//! The catalog is an opaque, paginated source of untyped JSON records. Every
//! record crosses into the crate through [`ingest::normalize`]; nothing else
//! reads provider JSON.
use serde_json::Value;
use std::collections::BTreeSet;

use crate::{error::AppResult, models::MediaKind};

pub mod fallback;
pub mod ingest;
pub mod tmdb;

pub use fallback::{CatalogFallback, FallbackProvider, StaticFallback};
pub use tmdb::TmdbCatalog;

/// Records per discovery page
pub const PAGE_SIZE: u32 = 20;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// One page (1-based) of discovery results for a media kind.
    ///
    /// With genres, a record matching any of them qualifies; tier ranking
    /// happens downstream.
    async fn discover(
        &self,
        media_kind: MediaKind,
        genre_ids: &BTreeSet<u32>,
        page: u32,
    ) -> AppResult<Vec<Value>>;

    /// Full record for a single title
    async fn details(&self, media_kind: MediaKind, id: u64) -> AppResult<Value>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
