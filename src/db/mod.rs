pub mod memory;
pub mod redis;
pub mod store;

pub use memory::InMemorySessionStore;
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use redis::CacheWriterHandle;
pub use redis::RedisSessionStore;
pub use store::{SessionKey, SessionStore};
