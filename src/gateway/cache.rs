use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use edgeway_adapter::{CachedResponse, EdgeCache};
use rama::http::{Body, Response, StatusCode, body::util::BodyExt, header};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::types::CacheStatus;

/// Diagnostic header attached wherever the cache adapter was consulted.
pub const CACHE_STATUS_HEADER: &str = "x-edge-cache";

/// Cache lookup that never surfaces an error to the gateway: adapter
/// failures and corrupt entries are evicted and reported as absent, so the
/// caller falls through to a live origin fetch.
pub async fn lookup(cache: &Arc<dyn EdgeCache>, key: &str) -> Option<Response<Body>> {
    match cache.lookup(key).await {
        Ok(Some(entry)) => match rebuild_response(&entry) {
            Ok(resp) => Some(mark(resp, CacheStatus::Hit)),
            Err(err) => {
                warn!(error = %err, key, "corrupt cache entry, evicting");
                if let Err(err) = cache.evict(key).await {
                    warn!(error = %err, key, "failed to evict corrupt entry");
                }
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, key, "cache lookup failed, evicting and refetching");
            if let Err(err) = cache.evict(key).await {
                warn!(error = %err, key, "failed to evict entry after lookup error");
            }
            None
        }
    }
}

/// Buffers an upstream response, stores a snapshot best-effort, and returns
/// the rebuilt response marked as a miss. Callers apply their header policy
/// (CORS, cache hints) before handing the response over, so hits replay the
/// same shape.
pub async fn store_and_respond(
    cache: &Arc<dyn EdgeCache>,
    key: &str,
    response: Response<Body>,
    with_checksum: bool,
) -> Result<Response<Body>> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .context("reading upstream response body")?
        .to_bytes();

    let mut headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter(|(name, _)| *name != header::TRANSFER_ENCODING)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    if with_checksum {
        let sha_hex = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        };
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case("x-checksum-sha256"));
        headers.push(("x-checksum-sha256".to_string(), sha_hex));
    }

    let snapshot = CachedResponse::new(parts.status.as_u16(), headers, bytes);
    let rebuilt = rebuild_response(&snapshot).context("rebuilding response after store")?;

    if let Err(err) = cache.store(key, snapshot).await {
        warn!(error = %err, key, "failed to store cache entry");
    }

    Ok(mark(rebuilt, CacheStatus::Miss))
}

/// Stamps the cache diagnostic header onto a response.
pub fn mark(mut response: Response<Body>, status: CacheStatus) -> Response<Body> {
    if let Ok(value) = header::HeaderValue::from_str(&status.to_string()) {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static(CACHE_STATUS_HEADER), value);
    }
    response
}

fn rebuild_response(entry: &CachedResponse) -> Result<Response<Body>> {
    let status =
        StatusCode::from_u16(entry.status).map_err(|_| anyhow!("invalid cached status"))?;
    let mut builder = Response::builder().status(status);
    {
        let headers = builder
            .headers_mut()
            .ok_or_else(|| anyhow!("failed to get headers for cached response"))?;
        for (name, value) in &entry.headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| anyhow!("invalid cached header name"))?;
            headers.insert(name, header::HeaderValue::from_str(value)?);
        }
        headers.insert(
            header::CONTENT_LENGTH,
            header::HeaderValue::from_str(&entry.body.len().to_string())?,
        );
    }
    builder
        .body(Body::from(entry.body.clone()))
        .map_err(Into::into)
}
