pub mod content_sets;
pub mod cursor;
pub mod fetcher;
pub mod filters;
pub mod lifecycle;
pub mod pipeline;
pub mod providers;
pub mod ranker;
pub mod selector;

pub use content_sets::{
    ContentSet, ContentSetService, ContentSetStatus, CuratedContent, CurationSettings,
};
pub use cursor::{CursorTracker, ParticipantProgress};
pub use fetcher::CatalogFetcher;
pub use filters::{CandidateFilter, FilterPipeline};
pub use lifecycle::LifecycleManager;
pub use pipeline::{BuiltSet, ContentPipeline};
pub use providers::{
    CatalogFallback, CatalogProvider, FallbackProvider, StaticFallback, TmdbCatalog,
};
pub use ranker::TieredPool;
pub use selector::{RandomSource, Selection, SupplyShortfall};
