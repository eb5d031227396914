//! Go module proxy gateway
//!
//! Routes between the module-mirror origin and the checksum-database origin
//! based on the path, plus the raw `/sumdb/` passthrough.

use anyhow::{Context, Result};
use rama::http::{
    Body, Request, Response, StatusCode, Uri,
    header::{self, HeaderMap, HeaderValue, USER_AGENT},
};

use super::types::CacheStatus;
use super::{response, utils};
use crate::config::Config;
use crate::relay::{self, Relay, UA};

const GATEWAY_PREFIX: &str = "/goproxy/";
const SUMDB_SEGMENT: &str = "sumdb/";

enum Branch<'a> {
    Checksum(&'a str),
    Mirror(&'a str),
}

fn branch_for(rest: &str) -> Branch<'_> {
    match rest.strip_prefix(SUMDB_SEGMENT) {
        Some(sumdb_path) => Branch::Checksum(sumdb_path),
        None => Branch::Mirror(rest),
    }
}

pub async fn handle_module_request(
    req: &Request<Body>,
    config: &Config,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let Some(rest) = req.uri().path().strip_prefix(GATEWAY_PREFIX) else {
        return Ok((
            response::respond_text(StatusCode::BAD_REQUEST, "bad request")?,
            CacheStatus::Pass,
        ));
    };

    match branch_for(rest) {
        Branch::Checksum(sumdb_path) => checksum_fetch(req, sumdb_path, relay).await,
        Branch::Mirror(module_path) => mirror_fetch(req, module_path, config, relay).await,
    }
}

/// The checksum database is sensitive to extraneous headers: the outbound
/// request carries only the client identifier and the caller's Accept.
async fn checksum_fetch(
    req: &Request<Body>,
    sumdb_path: &str,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let target: Uri = format!("https://{sumdb_path}{}", query_suffix(req))
        .parse()
        .context("parsing checksum database target")?;

    let mut headers = HeaderMap::new();
    if let Some(accept) = req.headers().get(header::ACCEPT) {
        headers.insert(header::ACCEPT, accept.clone());
    }

    let upstream = relay
        .get(target, &headers)
        .await
        .context("requesting checksum database")?;
    Ok((relay::sanitize_response(upstream), CacheStatus::Pass))
}

async fn mirror_fetch(
    req: &Request<Body>,
    module_path: &str,
    config: &Config,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let target: Uri = format!(
        "{}/{module_path}{}",
        utils::origin_base(&config.goproxy.mirror_url),
        query_suffix(req)
    )
    .parse()
    .context("parsing module mirror target")?;

    let mut builder = Request::builder().method(req.method().clone()).uri(target);
    {
        let headers = builder
            .headers_mut()
            .context("getting outbound request headers")?;
        utils::copy_request_headers(req.headers(), headers);
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    }
    let outbound = builder
        .body(Body::empty())
        .context("building module mirror request")?;

    let upstream = relay
        .send(outbound)
        .await
        .context("requesting module mirror")?;

    // Errors and redirects propagate untouched; only successful bodies get
    // re-wrapped through a fresh pipe.
    if !upstream.status().is_success() {
        return Ok((relay::sanitize_response(upstream), CacheStatus::Pass));
    }
    Ok((
        relay::restream(relay::sanitize_response(upstream)),
        CacheStatus::Pass,
    ))
}

/// Raw checksum passthrough: `/sumdb/<host>/<rest>` relays to
/// `https://<host>/<rest>` with no header forwarding at all.
pub async fn handle_sumdb_passthrough(
    req: &Request<Body>,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let rest = req.uri().path().strip_prefix("/sumdb/").unwrap_or("");
    if rest.is_empty() {
        return Ok((
            response::respond_empty(StatusCode::NOT_FOUND)?,
            CacheStatus::Pass,
        ));
    }

    let target: Uri = format!("https://{rest}{}", query_suffix(req))
        .parse()
        .context("parsing checksum passthrough target")?;
    let upstream = relay
        .get(target, &HeaderMap::new())
        .await
        .context("requesting checksum origin")?;
    Ok((relay::sanitize_response(upstream), CacheStatus::Pass))
}

fn query_suffix(req: &Request<Body>) -> String {
    req.uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default()
}
