use std::time::Instant;

use rama::http::{Body, Method, Request};

/// Cache status for request tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Pass,
    Hit,
    Miss,
    Error,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Pass => write!(f, "pass"),
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Miss => write!(f, "miss"),
            CacheStatus::Error => write!(f, "error"),
        }
    }
}

/// Request context for tracking request lifecycle
pub struct RequestContext {
    pub start: Instant,
    pub method: Method,
    pub path: String,
    pub cache: CacheStatus,
}

impl RequestContext {
    pub fn from_request(req: &Request<Body>) -> Self {
        Self {
            start: Instant::now(),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            cache: CacheStatus::Pass,
        }
    }
}

/// Gateways mounted by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Registry,
    ModuleProxy,
    SumdbPassthrough,
    Mirror,
    Chat,
    Models,
    Health,
    Homepage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact,
    Prefix,
}

/// Ordered routing table, first match wins. Adding a mirror means adding a
/// row here, nowhere else; priority is exactly the order below.
pub const ROUTES: &[(&str, Pattern, Route)] = &[
    ("/v2", Pattern::Prefix, Route::Registry),
    ("/goproxy", Pattern::Prefix, Route::ModuleProxy),
    ("/sumdb/", Pattern::Prefix, Route::SumdbPassthrough),
    ("/cdn/", Pattern::Prefix, Route::Mirror),
    ("/chat/completions", Pattern::Prefix, Route::Chat),
    ("/models", Pattern::Exact, Route::Models),
    ("/up", Pattern::Exact, Route::Health),
    ("/", Pattern::Exact, Route::Homepage),
];

pub fn route_for_path(path: &str) -> Option<Route> {
    ROUTES.iter().find_map(|(pattern, kind, route)| {
        let matched = match kind {
            Pattern::Exact => path == *pattern,
            Pattern::Prefix => path.starts_with(pattern),
        };
        matched.then_some(*route)
    })
}
