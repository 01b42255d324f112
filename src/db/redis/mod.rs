pub mod cache;
pub mod session_store;

mod macros;

pub use cache::create_redis_client;
pub use cache::Cache;
pub use cache::CacheKey;
pub use cache::CacheWriterHandle;
pub use session_store::RedisSessionStore;
