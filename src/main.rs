use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curator_api::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{create_redis_client, Cache, InMemorySessionStore, RedisSessionStore, SessionStore},
    services::{
        CatalogFallback, CatalogFetcher, CatalogProvider, ContentPipeline, ContentSetService,
        CurationSettings, FallbackProvider, FilterPipeline, RandomSource, StaticFallback,
        TmdbCatalog,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (store, cache, cache_handle) = match config.store_backend {
        StoreBackend::Redis => {
            let client = create_redis_client(&config.redis_url)?;
            let store = RedisSessionStore::new(client.clone(), config.session_ttl_secs)
                .await
                .context("Failed to connect the Redis session store")?;
            let (cache, handle) = Cache::new(client).await;
            (Arc::new(store) as Arc<dyn SessionStore>, Some(cache), Some(handle))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory session store; sessions are lost on restart");
            (
                Arc::new(InMemorySessionStore::new()) as Arc<dyn SessionStore>,
                None,
                None,
            )
        }
    };

    let catalog: Arc<dyn CatalogProvider> = Arc::new(TmdbCatalog::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.fetch_timeout(),
        cache,
    )?);

    let fallback_ids = config.fallback_id_list();
    let fallback: Arc<dyn FallbackProvider> = if fallback_ids.is_empty() {
        Arc::new(StaticFallback::new())
    } else {
        Arc::new(CatalogFallback::new(catalog.clone(), fallback_ids))
    };

    let pipeline = ContentPipeline::new(
        CatalogFetcher::new(
            catalog,
            config.fetch_concurrency,
            config.fetch_timeout(),
            config.max_pages,
        ),
        FilterPipeline::default(),
        RandomSource::from_seed(config.shuffle_seed),
    );

    let content_sets = ContentSetService::new(
        store.clone(),
        pipeline,
        fallback.clone(),
        CurationSettings::from_config(&config),
    );

    let app = create_router(AppState::new(content_sets));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        store = store.name(),
        fallback = fallback.name(),
        content_set_size = config.content_set_size,
        "Curator API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
