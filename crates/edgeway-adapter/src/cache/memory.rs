use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::EdgeCache;
use super::types::{CacheStats, CachedResponse};

/// In-process response cache.
///
/// Bounded by entry count; when full, the oldest entry makes room. All
/// synchronization is internal, so gateways share one instance behind an
/// `Arc` without taking locks of their own.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedResponse>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl MemoryCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }
}

#[async_trait]
impl EdgeCache for MemoryCache {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        let now = Utc::now();
        let found = self.entries.read().get(key).cloned();
        match found {
            Some(entry) if entry.is_fresh(self.default_ttl, now) => Ok(Some(entry)),
            Some(_) => {
                debug!(key, "evicting stale cache entry");
                self.entries.write().remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, response: CachedResponse) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(key = %oldest, "cache full, dropping oldest entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), response);
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.default_ttl, now));
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read();
        Ok(CacheStats {
            entries: entries.len() as u64,
            total_bytes: entries.values().map(CachedResponse::size_bytes).sum(),
        })
    }
}
