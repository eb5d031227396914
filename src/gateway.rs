mod cache;
mod chat;
mod handlers;
mod mirror;
mod modproxy;
mod registry;
mod response;
mod types;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use edgeway_adapter::EdgeCache;
use rama::{
    Service,
    error::BoxError,
    http::{Body, Request, Response, StatusCode},
};
use tracing::{error, info};

use crate::config::Config;
use crate::relay::Relay;

// Re-export public types
pub use cache::CACHE_STATUS_HEADER;
pub use types::{CacheStatus, RequestContext, Route, route_for_path};
pub use utils::{
    AuthChallenge, MalformedChallenge, normalize_scope, parse_auth_challenge,
    resolve_mirror_target, rewrite_cnb_path,
};

/// Main gateway service
///
/// Every inbound request is classified once against the ordered route table
/// and dispatched to exactly one gateway. Shared state is limited to the
/// cache adapter; everything else is request-scoped.
#[derive(Clone)]
pub struct EdgeGateway {
    config: Arc<Config>,
    cache: Arc<dyn EdgeCache>,
    relay: Relay,
}

impl EdgeGateway {
    pub fn new(config: Arc<Config>, cache: Arc<dyn EdgeCache>) -> Self {
        Self {
            config,
            cache,
            relay: Relay,
        }
    }

    async fn handle(
        &self,
        req: Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Response<Body>> {
        let Some(route) = types::route_for_path(req.uri().path()) else {
            ctx.cache = CacheStatus::Pass;
            return response::respond_empty(StatusCode::NOT_FOUND);
        };

        let (resp, cache_status) = match route {
            Route::Registry => {
                registry::handle_registry_request(req, &self.config, &self.cache, &self.relay)
                    .await?
            }
            Route::ModuleProxy => {
                modproxy::handle_module_request(&req, &self.config, &self.relay).await?
            }
            Route::SumdbPassthrough => {
                modproxy::handle_sumdb_passthrough(&req, &self.relay).await?
            }
            Route::Mirror => {
                mirror::handle_mirror_request(&req, &self.config, &self.cache, &self.relay)
                    .await?
            }
            Route::Chat => chat::handle_chat_request(req, &self.config, &self.relay).await?,
            Route::Models => chat::handle_models(&req, &self.config)?,
            Route::Health => handlers::handle_health(self.cache.as_ref()).await?,
            Route::Homepage => (response::respond_homepage(&self.config)?, CacheStatus::Pass),
        };

        ctx.cache = cache_status;
        Ok(resp)
    }

    fn request_summary(&self, ctx: &RequestContext) -> String {
        format!("{} {}", ctx.method.as_str(), ctx.path)
    }
}

impl Service<Request<Body>> for EdgeGateway {
    type Output = Response<Body>;
    type Error = BoxError;

    async fn serve(&self, req: Request<Body>) -> Result<Self::Output, Self::Error> {
        let mut ctx = RequestContext::from_request(&req);

        let result = self.handle(req, &mut ctx).await;

        match &result {
            Ok(resp) => {
                let response_code = resp.status().as_u16();
                let duration_ms = ctx.start.elapsed().as_millis();
                info!(
                    summary = %self.request_summary(&ctx),
                    response_code,
                    duration_ms,
                    cache_status = %ctx.cache,
                    "request handled"
                );
            }
            Err(err) => {
                let duration_ms = ctx.start.elapsed().as_millis();
                error!(
                    summary = %self.request_summary(&ctx),
                    duration_ms,
                    cache_status = %ctx.cache,
                    error = %err,
                    "request failed"
                );
            }
        }

        result.map_err(|e| e.into())
    }
}
