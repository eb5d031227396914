//! Chat-completion relay
//!
//! Three entry points share one contract: forward a JSON chat-completion
//! body to the single configured upstream. They differ only in streaming
//! fidelity and timeout policy. The `/models` catalog endpoint lives here
//! too since it serves the same callers.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use rama::http::{
    Body, Method, Request, Response, StatusCode,
    body::util::BodyExt,
    header::{self, HeaderValue, USER_AGENT},
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde_json::{Value as JsonValue, json};

use super::types::CacheStatus;
use super::response;
use crate::config::Config;
use crate::relay::{self, Relay, UA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVariant {
    /// Forwards the body verbatim, streaming or buffered per the caller.
    PassThrough,
    /// Same shape with a long explicit outbound deadline and `no-store`.
    TimeoutExtended,
    /// Consumes an upstream stream internally and fabricates one
    /// non-streaming completion object.
    Synthesizing,
}

pub fn variant_for_path(path: &str) -> Option<ChatVariant> {
    match path {
        "/chat/completions" => Some(ChatVariant::PassThrough),
        "/chat/completions/extended" => Some(ChatVariant::TimeoutExtended),
        "/chat/completions/compat" => Some(ChatVariant::Synthesizing),
        _ => None,
    }
}

pub async fn handle_chat_request(
    req: Request<Body>,
    config: &Config,
    relay: &Relay,
) -> Result<(Response<Body>, CacheStatus)> {
    let Some(variant) = variant_for_path(req.uri().path()) else {
        return Ok((
            response::respond_empty(StatusCode::NOT_FOUND)?,
            CacheStatus::Pass,
        ));
    };

    if req.method() == Method::OPTIONS {
        return Ok((response::respond_preflight()?, CacheStatus::Pass));
    }
    if req.method() != Method::POST {
        let mut resp = response::respond_text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")?;
        response::apply_cors(resp.headers_mut());
        return Ok((resp, CacheStatus::Pass));
    }

    let inbound_auth = req.headers().get(header::AUTHORIZATION).cloned();
    let body_bytes = req
        .into_body()
        .collect()
        .await
        .context("reading chat request body")?
        .to_bytes();
    let payload: JsonValue = serde_json::from_slice(&body_bytes).unwrap_or(JsonValue::Null);
    let wants_stream = payload
        .get("stream")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    let deadline = match variant {
        ChatVariant::TimeoutExtended => {
            Some(Duration::from_secs(config.chat.extended_timeout_secs))
        }
        _ => None,
    };

    let resp = match variant {
        ChatVariant::PassThrough | ChatVariant::TimeoutExtended => {
            let upstream =
                send_upstream(config, relay, inbound_auth, body_bytes, deadline).await?;
            let mut resp = complete_or_stream(upstream, wants_stream).await?;
            response::apply_cors(resp.headers_mut());
            if variant == ChatVariant::TimeoutExtended {
                resp.headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            }
            resp
        }
        ChatVariant::Synthesizing => {
            let Some(mut outbound_payload) = payload.as_object().cloned() else {
                let mut resp =
                    response::respond_text(StatusCode::BAD_REQUEST, "invalid JSON body")?;
                response::apply_cors(resp.headers_mut());
                return Ok((resp, CacheStatus::Pass));
            };
            // always stream from the upstream, whatever the caller asked for
            outbound_payload.insert("stream".to_string(), json!(true));
            let outbound_bytes = Bytes::from(
                serde_json::to_vec(&outbound_payload).context("serializing chat body")?,
            );
            let upstream =
                send_upstream(config, relay, inbound_auth, outbound_bytes, None).await?;

            if wants_stream {
                // the caller streams anyway, no synthesis needed
                let mut resp = relay::restream(relay::sanitize_response(upstream));
                response::apply_cors(resp.headers_mut());
                resp
            } else if !upstream.status().is_success() {
                let mut resp = complete_or_stream(upstream, false).await?;
                response::apply_cors(resp.headers_mut());
                resp
            } else {
                let raw = upstream
                    .into_body()
                    .collect()
                    .await
                    .context("draining upstream event stream")?
                    .to_bytes();
                let content = aggregate_stream_content(&String::from_utf8_lossy(&raw));
                let model = payload
                    .get("model")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("unknown");
                let completion =
                    fabricate_completion(model, &content, prompt_chars(&payload));
                let mut resp =
                    response::respond_json(StatusCode::OK, &completion.to_string())?;
                response::apply_cors(resp.headers_mut());
                resp
            }
        }
    };

    Ok((resp, CacheStatus::Pass))
}

/// Static model catalog, shaped like the upstream's own listing.
pub fn handle_models(
    req: &Request<Body>,
    config: &Config,
) -> Result<(Response<Body>, CacheStatus)> {
    if req.method() == Method::OPTIONS {
        return Ok((response::respond_preflight()?, CacheStatus::Pass));
    }

    let data: Vec<JsonValue> = config
        .chat
        .models
        .iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "edgeway"}))
        .collect();
    let body = json!({"object": "list", "data": data});
    let mut resp = response::respond_json(StatusCode::OK, &body.to_string())?;
    response::apply_cors(resp.headers_mut());
    Ok((resp, CacheStatus::Pass))
}

async fn send_upstream(
    config: &Config,
    relay: &Relay,
    inbound_auth: Option<HeaderValue>,
    body: Bytes,
    deadline: Option<Duration>,
) -> Result<Response<Body>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(config.chat.url.clone());
    {
        let headers = builder
            .headers_mut()
            .context("getting outbound request headers")?;
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
        // configured key wins; otherwise the caller's own credential rides
        // through untouched
        if let Some(key) = &config.chat.api_key {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))?,
            );
        } else if let Some(auth) = inbound_auth {
            headers.insert(header::AUTHORIZATION, auth);
        }
    }
    let outbound = builder
        .body(Body::from(body))
        .context("building chat request")?;

    match deadline {
        Some(deadline) => relay.send_with_timeout(outbound, deadline).await,
        None => relay.send(outbound).await,
    }
    .context("requesting completion upstream")
}

/// Streamed callers get a fresh pipe immediately; buffered callers wait for
/// the whole upstream text.
async fn complete_or_stream(
    upstream: Response<Body>,
    wants_stream: bool,
) -> Result<Response<Body>> {
    let upstream = relay::sanitize_response(upstream);
    if wants_stream {
        return Ok(relay::restream(upstream));
    }
    let (parts, body) = upstream.into_parts();
    let bytes = body
        .collect()
        .await
        .context("reading completion body")?
        .to_bytes();
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Concatenates the incremental content of every parseable `data:` line.
/// The `[DONE]` sentinel and lines that fail to parse are skipped, never
/// fatal.
fn aggregate_stream_content(text: &str) -> String {
    let mut content = String::new();
    for line in text.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<JsonValue>(data) else {
            continue;
        };
        if let Some(delta) = chunk
            .pointer("/choices/0/delta/content")
            .and_then(JsonValue::as_str)
        {
            content.push_str(delta);
        }
    }
    content
}

/// Character count of every message content in the request, standing in for
/// real prompt tokenization.
fn prompt_chars(payload: &JsonValue) -> usize {
    payload
        .get("messages")
        .and_then(JsonValue::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.get("content").and_then(JsonValue::as_str))
                .map(|content| content.chars().count())
                .sum()
        })
        .unwrap_or(0)
}

/// Builds the single non-streaming completion object from aggregated
/// stream content. Usage counts are character lengths, not tokenizer
/// output.
fn fabricate_completion(model: &str, content: &str, prompt_chars: usize) -> JsonValue {
    use rand::Rng;
    const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = SmallRng::from_os_rng();
    let id: String = (0..24)
        .map(|_| ID_CHARS[rng.random_range(0..ID_CHARS.len())] as char)
        .collect();
    let completion_chars = content.chars().count();
    json!({
        "id": format!("chatcmpl-{id}"),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt_chars,
            "completion_tokens": completion_chars,
            "total_tokens": prompt_chars + completion_chars
        }
    })
}
