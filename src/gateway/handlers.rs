use anyhow::Result;
use edgeway_adapter::EdgeCache;
use rama::http::{Body, Response, StatusCode};
use serde_json::json;

use super::response::respond_json;
use super::types::CacheStatus;

/// Handles health check requests
pub async fn handle_health(
    cache: &dyn EdgeCache,
) -> Result<(Response<Body>, CacheStatus)> {
    let mut ok = true;
    let mut checks = Vec::new();

    match cache.stats().await {
        Ok(stats) => {
            checks.push(json!({
                "component": "edge_cache",
                "status": "ok",
                "entries": stats.entries,
                "total_bytes": stats.total_bytes,
            }));
        }
        Err(err) => {
            ok = false;
            checks.push(json!({
                "component": "edge_cache",
                "status": "error",
                "error": err.to_string()
            }));
        }
    }

    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if ok { "ok" } else { "degraded" },
        "checks": checks,
    });

    let resp = respond_json(status, &body.to_string())?;
    Ok((
        resp,
        if ok {
            CacheStatus::Pass
        } else {
            CacheStatus::Error
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeway_adapter::MemoryCache;
    use rama::http::body::util::BodyExt;
    use std::time::Duration;

    #[tokio::test]
    async fn healthy_cache_reports_ok() {
        let cache = MemoryCache::new(4, Duration::from_secs(60));
        let (resp, status) = handle_health(&cache).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(status, CacheStatus::Pass);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"][0]["component"], "edge_cache");
    }
}
