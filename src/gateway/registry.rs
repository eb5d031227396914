//! Container registry gateway
//!
//! Relays the Docker Registry v2 protocol: bearer-token challenge flow,
//! blob cache-aside, and single-hop redirect following. The gateway
//! re-anchors the registry's auth discovery at its own `/v2/auth` endpoint
//! so clients never talk to the origin's token server directly.

use std::sync::Arc;

use anyhow::{Context, Result};
use edgeway_adapter::EdgeCache;
use rama::http::{
    Body, Method, Request, Response, StatusCode, Uri,
    header::{self, HeaderMap, HeaderValue},
};
use url::form_urlencoded;

use super::types::CacheStatus;
use super::utils::{self, AuthChallenge};
use super::{cache, response};
use crate::config::Config;
use crate::relay::{self, Relay};

/// Service identifier announced in locally built challenges.
const AUTH_SERVICE: &str = "edgeway";

pub async fn handle_registry_request(
    req: Request<Body>,
    config: &Config,
    cache_handle: &Arc<dyn EdgeCache>,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let path = req.uri().path().to_owned();
    match path.as_str() {
        "/v2" | "/v2/" => root_probe(&req, config, relay).await,
        "/v2/auth" => token_exchange(&req, config, relay).await,
        _ => {
            if let Some(location) = autonamespace_redirect(&path, req.uri().query()) {
                let resp = Response::builder()
                    .status(StatusCode::MOVED_PERMANENTLY)
                    .header(header::LOCATION, HeaderValue::from_str(&location)?)
                    .body(Body::empty())?;
                return Ok((resp, CacheStatus::Pass));
            }
            forward_fetch(req, config, cache_handle, relay).await
        }
    }
}

/// `GET /v2/`: probe the origin root, forwarding only the caller's
/// Authorization. A 401 is rewritten into this gateway's own challenge;
/// everything else returns verbatim.
async fn root_probe(
    req: &Request<Body>,
    config: &Config,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let mut headers = HeaderMap::new();
    if let Some(auth) = req.headers().get(header::AUTHORIZATION) {
        headers.insert(header::AUTHORIZATION, auth.clone());
    }

    let upstream = relay
        .get(registry_root(config)?, &headers)
        .await
        .context("probing registry root")?;

    if upstream.status() == StatusCode::UNAUTHORIZED {
        let resp = unauthorized_challenge(req.headers(), config)?;
        return Ok((resp, CacheStatus::Pass));
    }
    Ok((relay::sanitize_response(upstream), CacheStatus::Pass))
}

/// `GET /v2/auth`: re-probe the origin unauthenticated, parse its challenge,
/// and relay the token request to the challenge's realm with a normalized
/// scope. The gateway neither inspects nor caches tokens.
async fn token_exchange(
    req: &Request<Body>,
    config: &Config,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let probe = relay
        .get(registry_root(config)?, &HeaderMap::new())
        .await
        .context("probing registry root")?;

    if probe.status() != StatusCode::UNAUTHORIZED {
        // origin is not enforcing auth, nothing to exchange
        return Ok((relay::sanitize_response(probe), CacheStatus::Pass));
    }

    let challenge_value = probe
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .context("registry answered 401 without a WWW-Authenticate challenge")?;
    let challenge = utils::parse_auth_challenge(challenge_value)?;

    let scope = query_param(req.uri().query(), "scope").map(|s| utils::normalize_scope(&s));
    let token_target = token_url(&challenge, scope.as_deref())?;

    let mut headers = HeaderMap::new();
    if let Some(auth) = req.headers().get(header::AUTHORIZATION) {
        headers.insert(header::AUTHORIZATION, auth.clone());
    }
    let token = relay
        .get(token_target, &headers)
        .await
        .context("requesting token server")?;
    Ok((relay::sanitize_response(token), CacheStatus::Pass))
}

/// Default branch: swap the host for the origin, forward headers and method
/// verbatim, and inspect redirects ourselves instead of following them.
async fn forward_fetch(
    req: Request<Body>,
    config: &Config,
    cache_handle: &Arc<dyn EdgeCache>,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target: Uri = format!(
        "{}{path_and_query}",
        utils::origin_base(&config.registry.url)
    )
    .parse()
    .context("building registry target")?;

    // Blobs are content-addressed and immutable, ideal cache candidates.
    let cacheable = parts.method == Method::GET && is_blob_path(parts.uri.path());
    let key = target.to_string();
    if cacheable && let Some(hit) = cache::lookup(cache_handle, &key).await {
        return Ok((hit, CacheStatus::Hit));
    }

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(target.clone());
    {
        let headers = builder
            .headers_mut()
            .context("getting outbound request headers")?;
        utils::copy_request_headers(&parts.headers, headers);
    }
    let outbound_line = format!("{} {target}", parts.method);
    let outbound = builder.body(body).context("building registry request")?;

    let upstream = relay
        .send(outbound)
        .await
        .context("requesting registry origin")?;

    match upstream.status() {
        StatusCode::UNAUTHORIZED => {
            let resp = unauthorized_challenge(&parts.headers, config)?;
            Ok((resp, CacheStatus::Pass))
        }
        // Upstream rate limiting surfaces as a 200 diagnostic, not a hard
        // failure; the body is the outbound request's string form.
        StatusCode::SERVICE_UNAVAILABLE => Ok((
            response::respond_text(StatusCode::OK, &outbound_line)?,
            CacheStatus::Pass,
        )),
        // Exactly one unauthenticated hop; the redirect target's answer is
        // returned directly.
        StatusCode::TEMPORARY_REDIRECT => {
            let location: Uri = upstream
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .context("registry 307 without a Location header")?
                .parse()
                .context("parsing redirect target")?;
            let follow = relay
                .get(location, &HeaderMap::new())
                .await
                .context("following blob redirect")?;
            Ok((relay::sanitize_response(follow), CacheStatus::Pass))
        }
        _ if cacheable => {
            let upstream = relay::sanitize_response(upstream);
            let stored = cache::store_and_respond(cache_handle, &key, upstream, true).await?;
            Ok((stored, CacheStatus::Miss))
        }
        _ => Ok((relay::sanitize_response(upstream), CacheStatus::Pass)),
    }
}

fn registry_root(config: &Config) -> Result<Uri> {
    format!("{}/v2/", utils::origin_base(&config.registry.url))
        .parse()
        .context("building registry root url")
}

fn is_blob_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "blobs")
}

/// Locally built 401 that re-anchors auth discovery at this gateway.
fn unauthorized_challenge(
    inbound_headers: &HeaderMap,
    config: &Config,
) -> Result<Response<Body>> {
    let base = gateway_base(inbound_headers, config);
    let challenge = format!("Bearer realm=\"{base}/v2/auth\",service=\"{AUTH_SERVICE}\"");
    let mut resp = response::respond_json(
        StatusCode::UNAUTHORIZED,
        "{\"message\":\"UNAUTHORIZED\"}",
    )?;
    resp.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_str(&challenge)?,
    );
    Ok(resp)
}

fn gateway_base(inbound_headers: &HeaderMap, config: &Config) -> String {
    if let Some(public) = &config.server.public_url {
        return public.trim_end_matches('/').to_string();
    }
    let host = inbound_headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("https://{host}")
}

fn token_url(challenge: &AuthChallenge, scope: Option<&str>) -> Result<Uri> {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("service", &challenge.service);
    if let Some(scope) = scope {
        query.append_pair("scope", scope);
    }
    let realm = challenge.realm.to_string();
    let separator = if realm.contains('?') { '&' } else { '?' };
    format!("{realm}{separator}{}", query.finish())
        .parse()
        .context("building token url")
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Mirrors the scope-level `library/` rule at the path level: a bare-name
/// `/v2/<name>/<kind>/<ref>` gets a 301 onto the namespaced path.
fn autonamespace_redirect(path: &str, query: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() != 5 || !parts[0].is_empty() || parts[1] != "v2" {
        return None;
    }
    let (name, kind, reference) = (parts[2], parts[3], parts[4]);
    if name.is_empty() || kind.is_empty() || reference.is_empty() {
        return None;
    }
    let query = query.map(|q| format!("?{q}")).unwrap_or_default();
    Some(format!("/v2/library/{name}/{kind}/{reference}{query}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // autonamespace_redirect tests
    // ============================================================================

    #[test]
    fn bare_manifest_path_redirects() {
        assert_eq!(
            autonamespace_redirect("/v2/busybox/manifests/latest", None).as_deref(),
            Some("/v2/library/busybox/manifests/latest")
        );
    }

    #[test]
    fn namespaced_path_untouched() {
        assert!(autonamespace_redirect("/v2/library/busybox/manifests/latest", None).is_none());
    }

    #[test]
    fn bare_blob_path_redirects() {
        assert_eq!(
            autonamespace_redirect("/v2/busybox/blobs/sha256:abc", None).as_deref(),
            Some("/v2/library/busybox/blobs/sha256:abc")
        );
    }

    #[test]
    fn short_paths_untouched() {
        assert!(autonamespace_redirect("/v2/", None).is_none());
        assert!(autonamespace_redirect("/v2/_catalog", None).is_none());
        assert!(autonamespace_redirect("/v2/busybox/tags", None).is_none());
    }

    #[test]
    fn empty_segments_untouched() {
        assert!(autonamespace_redirect("/v2/busybox/manifests/", None).is_none());
        assert!(autonamespace_redirect("/v2//manifests/latest", None).is_none());
    }

    #[test]
    fn redirect_preserves_query() {
        assert_eq!(
            autonamespace_redirect("/v2/busybox/manifests/latest", Some("ns=docker.io")).as_deref(),
            Some("/v2/library/busybox/manifests/latest?ns=docker.io")
        );
    }

    // ============================================================================
    // token_url tests
    // ============================================================================

    fn challenge() -> AuthChallenge {
        AuthChallenge {
            realm: Uri::from_static("https://auth.example.com/token"),
            service: "registry.example.com".to_string(),
        }
    }

    #[test]
    fn token_url_with_scope() {
        let url = token_url(&challenge(), Some("repository:library/busybox:pull")).unwrap();
        assert_eq!(
            url.to_string(),
            "https://auth.example.com/token?service=registry.example.com&scope=repository%3Alibrary%2Fbusybox%3Apull"
        );
    }

    #[test]
    fn token_url_without_scope() {
        let url = token_url(&challenge(), None).unwrap();
        assert_eq!(
            url.to_string(),
            "https://auth.example.com/token?service=registry.example.com"
        );
    }

    #[test]
    fn token_url_appends_to_existing_query() {
        let ch = AuthChallenge {
            realm: Uri::from_static("https://auth.example.com/token?mode=pull"),
            service: "svc".to_string(),
        };
        let url = token_url(&ch, None).unwrap();
        assert_eq!(
            url.to_string(),
            "https://auth.example.com/token?mode=pull&service=svc"
        );
    }

    // ============================================================================
    // query_param tests
    // ============================================================================

    #[test]
    fn query_param_decodes_value() {
        assert_eq!(
            query_param(Some("scope=repository%3Abusybox%3Apull"), "scope").as_deref(),
            Some("repository:busybox:pull")
        );
    }

    #[test]
    fn query_param_missing() {
        assert!(query_param(Some("service=reg"), "scope").is_none());
        assert!(query_param(None, "scope").is_none());
    }

    // ============================================================================
    // challenge construction tests
    // ============================================================================

    #[test]
    fn challenge_points_at_gateway_auth_endpoint() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "edge.example.com".parse().unwrap());
        let resp = unauthorized_challenge(&headers, &Config::default()).unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"https://edge.example.com/v2/auth\",service=\"edgeway\""
        );
    }

    #[test]
    fn challenge_respects_public_url_override() {
        let mut config = Config::default();
        config.server.public_url = Some("https://mirror.example.org/".to_string());
        let resp = unauthorized_challenge(&HeaderMap::new(), &config).unwrap();
        let value = resp
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(value.contains("https://mirror.example.org/v2/auth"));
    }

    // ============================================================================
    // blob path classification tests
    // ============================================================================

    #[test]
    fn blob_paths_detected() {
        assert!(is_blob_path("/v2/library/busybox/blobs/sha256:abc"));
        assert!(!is_blob_path("/v2/library/busybox/manifests/latest"));
        assert!(!is_blob_path("/v2/blobsmith/manifests/latest"));
    }
}
