use anyhow::Result;
use rama::http::{Body, HeaderMap, Response, StatusCode, header};

use crate::config::Config;

/// Responds with plain text
pub fn respond_text(status: StatusCode, body: &str) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .header(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        )
        .body(Body::from(body.to_owned()))
        .map_err(Into::into)
}

/// Responds with JSON content
pub fn respond_json(status: StatusCode, body: &str) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(status);
    {
        let headers = builder
            .headers_mut()
            .expect("headers available while building response");
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        );
        headers.insert(
            header::CONTENT_LENGTH,
            header::HeaderValue::from_str(&body.len().to_string())?,
        );
    }
    builder
        .body(Body::from(body.to_owned()))
        .map_err(Into::into)
}

/// Responds with an empty body, used for routing misses
pub fn respond_empty(status: StatusCode) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .map_err(Into::into)
}

/// Replaces whatever origin policy the upstream declared with the
/// gateway-wide wildcard.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.remove(header::ACCESS_CONTROL_ALLOW_ORIGIN);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
}

/// Standard preflight answer shared by every CORS-enabled endpoint.
pub fn respond_preflight() -> Result<Response<Body>> {
    let mut builder = Response::builder().status(StatusCode::NO_CONTENT);
    {
        let headers = builder
            .headers_mut()
            .expect("headers available while building response");
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            header::HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            header::HeaderValue::from_static("Content-Type, Authorization"),
        );
    }
    builder.body(Body::empty()).map_err(Into::into)
}

/// Responds with the homepage HTML
pub fn respond_homepage(config: &Config) -> Result<Response<Body>> {
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Edgeway</title>
    <style>
      body {{
        margin: 0;
        min-height: 100vh;
        display: flex;
        align-items: center;
        justify-content: center;
        background: #0f1117;
        color: #f4f6ff;
        font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif;
      }}
      main {{
        max-width: 560px;
        padding: 2.5rem;
        border-radius: 16px;
        background: #1a1e29;
      }}
      h1 {{ font-size: 1.8rem; margin: 0 0 1rem; }}
      code {{
        padding: 0.15rem 0.4rem;
        border-radius: 6px;
        background: #2a3040;
        font-size: 0.9rem;
      }}
      li {{ margin-bottom: 0.4rem; }}
    </style>
  </head>
  <body>
    <main>
      <h1>Edgeway is online</h1>
      <p>This node proxies upstream traffic from <code>http://{host}:{port}</code>:</p>
      <ul>
        <li><code>/v2/</code> container-image registry</li>
        <li><code>/goproxy/</code> Go module mirror and checksum database</li>
        <li><code>/cdn/</code> static package mirrors</li>
        <li><code>/chat/completions</code> completion relay</li>
      </ul>
    </main>
  </body>
</html>
"#,
        host = config.server.host,
        port = config.server.port
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/html; charset=utf-8"),
        )
        .header(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        )
        .body(Body::from(body))
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_carries_standard_allow_headers() {
        let resp = respond_preflight().unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[test]
    fn apply_cors_overrides_upstream_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            "https://origin.example.com".parse().unwrap(),
        );
        apply_cors(&mut headers);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[test]
    fn empty_response_has_no_body_headers() {
        let resp = respond_empty(StatusCode::NOT_FOUND).unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get(header::CONTENT_TYPE).is_none());
    }
}
