pub mod memory;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

// Re-export commonly used types
pub use memory::MemoryCache;
pub use types::{CacheStats, CachedResponse, cache_control_ttl};

/// Shared response cache consulted by the proxy gateways.
///
/// Keys are canonical outbound URLs. Values are full response snapshots;
/// freshness is interpreted by the adapter from each entry's own
/// `Cache-Control` header, so callers never deal with expiry themselves.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// Look up a stored response. Stale entries are evicted and reported
    /// as absent.
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>>;

    /// Store a response snapshot under the given key.
    async fn store(&self, key: &str, response: CachedResponse) -> Result<()>;

    /// Remove an entry, if present.
    async fn evict(&self, key: &str) -> Result<()>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;

    /// Current entry count and payload volume.
    async fn stats(&self) -> Result<CacheStats>;
}
