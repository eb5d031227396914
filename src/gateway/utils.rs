use rama::http::{
    Uri,
    header::{self, HeaderMap, HeaderName},
};
use thiserror::Error;

use crate::config::MirrorConfig;

/// Raised when a `WWW-Authenticate` value cannot be decomposed into a
/// bearer challenge. This is the one hard parse failure in the gateway
/// core; everything else soft-fails to "no match".
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed bearer challenge")]
pub struct MalformedChallenge;

/// Parsed `Bearer realm="...",service="..."` challenge.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub realm: Uri,
    pub service: String,
}

/// Extracts the first two double-quoted values following `=` from a
/// `WWW-Authenticate` header. The realm is only required to be usable as a
/// URI, nothing more.
pub fn parse_auth_challenge(value: &str) -> Result<AuthChallenge, MalformedChallenge> {
    let values = quoted_values(value);
    if values.len() < 2 {
        return Err(MalformedChallenge);
    }
    let realm: Uri = values[0].parse().map_err(|_| MalformedChallenge)?;
    Ok(AuthChallenge {
        realm,
        service: values[1].to_string(),
    })
}

fn quoted_values(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = value.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'=' && bytes[i + 1] == b'"' {
            let start = i + 2;
            match value[start..].find('"') {
                Some(end) => {
                    out.push(&value[start..start + end]);
                    i = start + end + 1;
                }
                None => break,
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Docker Hub keeps official images under an implicit `library/` namespace.
/// A `repository:<name>:<action>` scope with an unqualified name is
/// rewritten accordingly; anything else passes through untouched.
pub fn normalize_scope(scope: &str) -> String {
    let parts: Vec<&str> = scope.split(':').collect();
    if parts.len() == 3 && !parts[1].contains('/') {
        format!("{}:library/{}:{}", parts[0], parts[1], parts[2])
    } else {
        scope.to_string()
    }
}

/// Namespaces served verbatim off the single CDN origin, first match wins.
const CDN_NAMESPACES: &[&str] = &["gh/", "npm/", "wp/"];

/// Classifies a `/cdn/` remainder into its outbound target URL.
///
/// Returns `None` for unknown namespaces so the mirror gateway can degrade
/// to 404 instead of 500.
pub fn resolve_mirror_target(rest: &str, mirror: &MirrorConfig) -> Option<String> {
    if CDN_NAMESPACES.iter().any(|ns| rest.starts_with(ns)) {
        return Some(format!("{}/{rest}", origin_base(&mirror.cdn_url)));
    }
    if let Some(cnb) = rest.strip_prefix("cnb/") {
        return rewrite_cnb_path(cnb, &mirror.cnb_url);
    }
    if rest.starts_with("http://") || rest.starts_with("https://") {
        return Some(rest.to_string());
    }
    None
}

/// Rewrites `<org>/<pkg>@<version>/<rest...>` into the source-control
/// raw-file URL. The package segment splits on the first `@`; any missing
/// component yields "no match" rather than an error.
pub fn rewrite_cnb_path(path: &str, base: &Uri) -> Option<String> {
    let mut segments = path.splitn(3, '/');
    let org = segments.next().filter(|s| !s.is_empty())?;
    let pkg_at_version = segments.next().filter(|s| !s.is_empty())?;
    let rest = segments.next().filter(|s| !s.is_empty())?;
    let (pkg, version) = pkg_at_version.split_once('@')?;
    if pkg.is_empty() || version.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{org}/{pkg}/-/git/raw/{version}/{rest}",
        origin_base(base)
    ))
}

/// Origin URL without its trailing slash, ready for path concatenation.
pub(crate) fn origin_base(url: &Uri) -> String {
    url.to_string().trim_end_matches('/').to_string()
}

/// Copies inbound headers onto an outbound request, dropping hop-by-hop
/// headers plus `Host` and `Content-Length`, which the transport recomputes.
pub fn copy_request_headers(source: &HeaderMap, target: &mut HeaderMap) {
    for (name, value) in source.iter() {
        if is_hop_header(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        target.insert(name, value.clone());
    }
}

fn is_hop_header(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::KEEP_ALIVE
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror() -> MirrorConfig {
        MirrorConfig::default()
    }

    // ============================================================================
    // parse_auth_challenge tests
    // ============================================================================

    #[test]
    fn parses_docker_hub_challenge() {
        let challenge = parse_auth_challenge(
            "Bearer realm=\"https://auth.example.com/token\",service=\"registry.example.com\"",
        )
        .unwrap();
        assert_eq!(challenge.realm.to_string(), "https://auth.example.com/token");
        assert_eq!(challenge.service, "registry.example.com");
    }

    #[test]
    fn parses_challenge_with_extra_parameters() {
        let challenge = parse_auth_challenge(
            "Bearer realm=\"https://auth.example.com/token\",service=\"reg\",scope=\"pull\"",
        )
        .unwrap();
        // only the first two quoted values count
        assert_eq!(challenge.service, "reg");
    }

    #[test]
    fn rejects_challenge_with_single_value() {
        assert_eq!(
            parse_auth_challenge("Bearer realm=\"https://auth.example.com/token\""),
            Err(MalformedChallenge)
        );
    }

    #[test]
    fn rejects_empty_challenge() {
        assert_eq!(parse_auth_challenge(""), Err(MalformedChallenge));
    }

    #[test]
    fn rejects_challenge_without_quotes() {
        assert_eq!(
            parse_auth_challenge("Bearer realm=token,service=reg"),
            Err(MalformedChallenge)
        );
    }

    #[test]
    fn rejects_unusable_realm() {
        assert_eq!(
            parse_auth_challenge("Bearer realm=\"not a uri\",service=\"reg\""),
            Err(MalformedChallenge)
        );
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert_eq!(
            parse_auth_challenge("Bearer realm=\"https://auth.example.com"),
            Err(MalformedChallenge)
        );
    }

    // ============================================================================
    // normalize_scope tests
    // ============================================================================

    #[test]
    fn scope_gains_library_namespace() {
        assert_eq!(
            normalize_scope("repository:busybox:pull"),
            "repository:library/busybox:pull"
        );
    }

    #[test]
    fn namespaced_scope_unchanged() {
        assert_eq!(
            normalize_scope("repository:library/busybox:pull"),
            "repository:library/busybox:pull"
        );
        assert_eq!(
            normalize_scope("repository:someorg/app:pull,push"),
            "repository:someorg/app:pull,push"
        );
    }

    #[test]
    fn scope_with_two_parts_unchanged() {
        assert_eq!(normalize_scope("repository:busybox"), "repository:busybox");
    }

    #[test]
    fn scope_with_four_parts_unchanged() {
        assert_eq!(
            normalize_scope("repository:busybox:pull:extra"),
            "repository:busybox:pull:extra"
        );
    }

    #[test]
    fn empty_scope_unchanged() {
        assert_eq!(normalize_scope(""), "");
    }

    // ============================================================================
    // resolve_mirror_target tests
    // ============================================================================

    #[test]
    fn gh_namespace_appends_verbatim() {
        assert_eq!(
            resolve_mirror_target("gh/user/repo@main/dist/app.js", &mirror()).as_deref(),
            Some("https://cdn.jsdelivr.net/gh/user/repo@main/dist/app.js")
        );
    }

    #[test]
    fn npm_namespace_appends_verbatim() {
        assert_eq!(
            resolve_mirror_target("npm/lodash@4.17.21/lodash.min.js", &mirror()).as_deref(),
            Some("https://cdn.jsdelivr.net/npm/lodash@4.17.21/lodash.min.js")
        );
    }

    #[test]
    fn wp_namespace_appends_verbatim() {
        assert_eq!(
            resolve_mirror_target("wp/plugins/akismet/trunk/akismet.js", &mirror()).as_deref(),
            Some("https://cdn.jsdelivr.net/wp/plugins/akismet/trunk/akismet.js")
        );
    }

    #[test]
    fn cnb_namespace_rewrites() {
        assert_eq!(
            resolve_mirror_target("cnb/myorg/mypkg@v1.0.0/src/lib.rs", &mirror()).as_deref(),
            Some("https://cnb.cool/myorg/mypkg/-/git/raw/v1.0.0/src/lib.rs")
        );
    }

    #[test]
    fn literal_url_passes_through() {
        assert_eq!(
            resolve_mirror_target("https://example.com/some/file.tar.gz", &mirror()).as_deref(),
            Some("https://example.com/some/file.tar.gz")
        );
        assert_eq!(
            resolve_mirror_target("http://example.com/file", &mirror()).as_deref(),
            Some("http://example.com/file")
        );
    }

    #[test]
    fn unknown_namespace_is_no_match() {
        assert!(resolve_mirror_target("pypi/requests/requests.tar.gz", &mirror()).is_none());
        assert!(resolve_mirror_target("", &mirror()).is_none());
    }

    // ============================================================================
    // rewrite_cnb_path tests
    // ============================================================================

    fn cnb_base() -> Uri {
        Uri::from_static("https://cnb.cool")
    }

    #[test]
    fn cnb_full_path_rewrites() {
        assert_eq!(
            rewrite_cnb_path("org/pkg@1.2.3/path/to/file.js", &cnb_base()).as_deref(),
            Some("https://cnb.cool/org/pkg/-/git/raw/1.2.3/path/to/file.js")
        );
    }

    #[test]
    fn cnb_splits_on_first_at_sign() {
        assert_eq!(
            rewrite_cnb_path("org/pkg@v1@beta/file", &cnb_base()).as_deref(),
            Some("https://cnb.cool/org/pkg/-/git/raw/v1@beta/file")
        );
    }

    #[test]
    fn cnb_missing_rest_is_no_match() {
        assert!(rewrite_cnb_path("org/pkg@1.2.3", &cnb_base()).is_none());
    }

    #[test]
    fn cnb_missing_version_is_no_match() {
        assert!(rewrite_cnb_path("org/pkg/file", &cnb_base()).is_none());
        assert!(rewrite_cnb_path("org/pkg@/file", &cnb_base()).is_none());
    }

    #[test]
    fn cnb_missing_pkg_is_no_match() {
        assert!(rewrite_cnb_path("org/@1.2.3/file", &cnb_base()).is_none());
    }

    #[test]
    fn cnb_missing_org_is_no_match() {
        assert!(rewrite_cnb_path("", &cnb_base()).is_none());
        assert!(rewrite_cnb_path("/pkg@1.2.3/file", &cnb_base()).is_none());
    }

    // ============================================================================
    // copy_request_headers tests
    // ============================================================================

    #[test]
    fn header_copy_drops_host_and_hop_headers() {
        let mut source = HeaderMap::new();
        source.insert(header::HOST, "edge.example.com".parse().unwrap());
        source.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        source.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        source.insert(header::ACCEPT, "application/json".parse().unwrap());
        source.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());

        let mut target = HeaderMap::new();
        copy_request_headers(&source, &mut target);

        assert!(target.get(header::HOST).is_none());
        assert!(target.get(header::CONNECTION).is_none());
        assert!(target.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(target.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(target.get(header::AUTHORIZATION).unwrap(), "Bearer tok");
    }
}
