//! Static mirror gateway
//!
//! Serves `/cdn/` requests from a handful of public content origins with
//! cache-aside semantics and CORS normalization.

use std::sync::Arc;

use anyhow::{Context, Result};
use edgeway_adapter::EdgeCache;
use rama::http::{
    Body, Method, Request, Response, StatusCode, Uri,
    header::{self, HeaderValue, USER_AGENT},
};

use super::types::CacheStatus;
use super::{cache, response, utils};
use crate::config::Config;
use crate::relay::{self, Relay, UA};

const GATEWAY_PREFIX: &str = "/cdn/";

pub async fn handle_mirror_request(
    req: &Request<Body>,
    config: &Config,
    cache_handle: &Arc<dyn EdgeCache>,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    if req.method() == Method::OPTIONS {
        return Ok((response::respond_preflight()?, CacheStatus::Pass));
    }

    let rest = req.uri().path().strip_prefix(GATEWAY_PREFIX).unwrap_or("");
    let Some(target) = utils::resolve_mirror_target(rest, &config.mirror) else {
        return Ok((
            response::respond_empty(StatusCode::NOT_FOUND)?,
            CacheStatus::Pass,
        ));
    };

    // Content fetches are idempotent; anything else bypasses the cache.
    let cacheable = req.method() == Method::GET;
    if cacheable && let Some(hit) = cache::lookup(cache_handle, &target).await {
        return Ok((hit, CacheStatus::Hit));
    }

    let uri: Uri = target
        .parse()
        .with_context(|| format!("parsing mirror target {target}"))?;
    let mut builder = Request::builder().method(req.method().clone()).uri(uri);
    {
        let headers = builder
            .headers_mut()
            .context("getting outbound request headers")?;
        if let Some(accept) = req.headers().get(header::ACCEPT) {
            headers.insert(header::ACCEPT, accept.clone());
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    }
    let outbound = builder
        .body(Body::empty())
        .context("building mirror request")?;

    let upstream = relay
        .send(outbound)
        .await
        .context("requesting mirror origin")?;

    if !upstream.status().is_success() {
        return Ok((relay::sanitize_response(upstream), CacheStatus::Pass));
    }

    let mut upstream = relay::sanitize_response(upstream);
    {
        let headers = upstream.headers_mut();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("s-maxage=60"),
        );
        response::apply_cors(headers);
    }

    if !cacheable {
        return Ok((upstream, CacheStatus::Pass));
    }

    let stored = cache::store_and_respond(cache_handle, &target, upstream, false).await?;
    Ok((stored, CacheStatus::Miss))
}
