use serde::Deserialize;
use std::time::Duration;

/// Largest content set a single build may aim for
pub const MAX_CONTENT_SET_SIZE: u32 = 1000;

/// Which session store implementation backs the service
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL (session store and catalog page cache)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// TMDB v3 API key
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of items curated per session
    #[serde(default = "default_content_set_size")]
    pub content_set_size: u32,

    /// Maximum catalog page requests in flight during one build
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Timeout applied to each catalog page request
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Upper bound on catalog pages requested per build
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// TTL of every key written for a session
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// How long a concurrent create waits for another caller's build
    #[serde(default = "default_build_wait_secs")]
    pub build_wait_secs: u64,

    /// Fixed shuffle seed; unset means OS entropy
    #[serde(default)]
    pub shuffle_seed: Option<u64>,

    /// Comma separated catalog ids served when a session has no content set
    #[serde(default)]
    pub fallback_ids: Option<String>,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_content_set_size() -> u32 {
    50
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_fetch_timeout_ms() -> u64 {
    2500
}

fn default_max_pages() -> u32 {
    10
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

fn default_build_wait_secs() -> u64 {
    15
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.content_set_size == 0 || self.content_set_size > MAX_CONTENT_SET_SIZE {
            anyhow::bail!("CONTENT_SET_SIZE must be between 1 and {}", MAX_CONTENT_SET_SIZE);
        }
        if self.fetch_concurrency == 0 {
            anyhow::bail!("FETCH_CONCURRENCY must be positive");
        }
        if self.max_pages == 0 {
            anyhow::bail!("MAX_PAGES must be positive");
        }
        // the build claim lapses after BUILD_WAIT_SECS; a build must fit inside it
        if self.build_wait() <= self.fetch_timeout() {
            anyhow::bail!("BUILD_WAIT_SECS must exceed FETCH_TIMEOUT_MS");
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn build_wait(&self) -> Duration {
        Duration::from_secs(self.build_wait_secs)
    }

    /// Parses `fallback_ids`, skipping blanks and anything non-numeric
    pub fn fallback_id_list(&self) -> Vec<u64> {
        self.fallback_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|raw| raw.trim().parse::<u64>().ok())
            .collect()
    }
}
