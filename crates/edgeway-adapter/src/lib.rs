mod cache;

pub use cache::{CacheStats, CachedResponse, EdgeCache, MemoryCache, cache_control_ttl};
