use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Full snapshot of an upstream response, as stored in the cache.
///
/// Header names are kept as received; lookups through [`CachedResponse::header`]
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// TTL declared by the entry's own `Cache-Control` header, if any.
    pub fn declared_ttl(&self) -> Option<Duration> {
        self.header("cache-control")
            .and_then(cache_control_ttl)
            .map(Duration::from_secs)
    }

    /// Whether the entry is still servable at `now`, falling back to
    /// `default_ttl` when the response declared no lifetime of its own.
    pub fn is_fresh(&self, default_ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = self.declared_ttl().unwrap_or(default_ttl).as_secs();
        if ttl == 0 {
            return false;
        }
        let age = now.signed_duration_since(self.stored_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) < ttl
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Aggregate cache counters surfaced by the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// Extracts the shared-cache lifetime from a `Cache-Control` value.
///
/// `s-maxage` wins over `max-age`; `no-store`/`no-cache` yield a zero
/// lifetime. Unparseable directives are ignored.
pub fn cache_control_ttl(value: &str) -> Option<u64> {
    let mut max_age = None;
    let mut s_maxage = None;
    for directive in value.split(',') {
        let directive = directive.trim();
        if directive.eq_ignore_ascii_case("no-store") || directive.eq_ignore_ascii_case("no-cache")
        {
            return Some(0);
        }
        if let Some((name, secs)) = directive.split_once('=') {
            let Ok(secs) = secs.trim().parse::<u64>() else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("s-maxage") {
                s_maxage = Some(secs);
            } else if name.trim().eq_ignore_ascii_case("max-age") {
                max_age = Some(secs);
            }
        }
    }
    s_maxage.or(max_age)
}
