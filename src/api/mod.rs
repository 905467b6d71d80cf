//! API layer - the relay handler and routing
//!
//! Everything under `/api` is relayed to the backend origin:
//! - CORS negotiation (allow-list echo or frontend fallback)
//! - Preflight answers
//! - Header rewriting and body forwarding
//! - Thumbnail cache-control and caching

pub mod cors;
pub mod error;
pub mod headers;
pub mod proxy;


use axum::{routing::any, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::cache::ThumbnailCache;
use crate::config::RelayConfig;

pub use error::{ApiError, ErrorBody, ProxyError};

/// Application state shared by every relay invocation
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayConfig>,
    /// Shared client; pooled connections to the backend
    pub client: reqwest::Client,
    /// `None` when thumbnail caching is disabled
    pub thumbnails: Option<Arc<ThumbnailCache>>,
}

impl AppState {
    /// Build the state and its HTTP client.
    ///
    /// Redirects are not followed: a backend 3xx is relayed to the browser
    /// like any other status.
    pub fn new(
        relay: RelayConfig,
        thumbnails: Option<Arc<ThumbnailCache>>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(relay.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            relay: Arc::new(relay),
            client,
            thumbnails,
        })
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api", any(proxy::proxy_request))
        .route("/api/", any(proxy::proxy_request))
        .route("/api/{*path}", any(proxy::proxy_request))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}
