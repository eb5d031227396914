use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream::unfold};
use rama::{
    Service,
    error::BoxError,
    http::{
        Body, Method, Request, Response, Uri,
        client::EasyHttpWebClient,
        header::{self, HeaderMap, HeaderValue, USER_AGENT},
        layer::trace::TraceLayer,
    },
    layer::Layer,
};
use tokio::sync::mpsc;

pub const UA: &str = concat!("edgeway/", env!("CARGO_PKG_VERSION"));

const PIPE_CAPACITY: usize = 16;

/// One-shot outbound HTTP relay.
///
/// Response bodies stream straight from the transport; nothing is buffered
/// before control returns to the caller. No retries: every failure surfaces
/// exactly once to the calling gateway.
#[derive(Clone, Default)]
pub struct Relay;

impl Relay {
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        let client = (TraceLayer::new_for_http(),).into_layer(EasyHttpWebClient::default());
        client
            .serve(request)
            .await
            .map_err(|e| anyhow!("outbound request failed: {e}"))
    }

    /// Same as [`Relay::send`] bounded by an explicit deadline. Used only by
    /// the timeout-extended chat variant; everything else relies on platform
    /// defaults.
    pub async fn send_with_timeout(
        &self,
        request: Request<Body>,
        deadline: Duration,
    ) -> Result<Response<Body>> {
        tokio::time::timeout(deadline, self.send(request))
            .await
            .map_err(|_| anyhow!("outbound request timed out after {}s", deadline.as_secs()))?
    }

    /// Header-controlled `GET` probe. The relay's own client identifier
    /// always wins over a caller-supplied one.
    pub async fn get(&self, url: Uri, headers: &HeaderMap) -> Result<Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(url);
        {
            let h = builder
                .headers_mut()
                .context("getting outbound request headers")?;
            for (name, value) in headers {
                h.insert(name, value.clone());
            }
            h.insert(USER_AGENT, HeaderValue::from_static(UA));
        }
        let request = builder
            .body(Body::empty())
            .context("building outbound request")?;
        self.send(request).await
    }
}

/// Re-wraps a response body as a fresh bounded single-producer pipe.
///
/// The spawned producer owns the upstream body: it closes the channel when
/// the origin finishes, errors, or the consumer goes away. Draining what
/// remains is the caller's responsibility.
pub fn restream(response: Response<Body>) -> Response<Body> {
    let (parts, body) = response.into_parts();
    let (tx, rx) = mpsc::channel::<Result<Bytes, BoxError>>(PIPE_CAPACITY);
    tokio::spawn(async move {
        let mut data = body.into_data_stream();
        while let Some(chunk) = data.next().await {
            let failed = chunk.is_err();
            if tx.send(chunk.map_err(Into::into)).await.is_err() || failed {
                break;
            }
        }
    });
    Response::from_parts(parts, Body::from_stream(receiver_stream(rx)))
}

/// Drops framing headers that no longer describe the re-served body; the
/// inbound transport chooses its own framing.
pub fn sanitize_response(response: Response<Body>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts.headers.remove(header::CONNECTION);
    Response::from_parts(parts, body)
}

/// Convert a tokio mpsc::Receiver into a Stream
fn receiver_stream<T>(rx: mpsc::Receiver<T>) -> impl Stream<Item = T> {
    unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
