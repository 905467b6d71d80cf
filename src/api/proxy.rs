//! Relay handler
//!
//! Forwards one inbound `/api/...` request to the configured backend and
//! relays the answer back with CORS headers.
//!
//! The relay:
//! 1. Validates the frontend/backend configuration (every request, every method)
//! 2. Resolves the `Access-Control-Allow-Origin` value
//! 3. Answers `OPTIONS` preflights itself
//! 4. Forwards method, filtered headers and (for non GET/HEAD) the body
//! 5. Streams the backend status, headers and body back unmodified, except for
//!    the forced `Cache-Control` on thumbnail routes
//!
//! Plain thumbnail GETs answered `200 OK` with a declared length within the
//! cache's entry limit are buffered and cached; everything else is streamed.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::api::{cors, headers, ApiError, AppState, ProxyError};
use crate::cache::CachedThumbnail;
use crate::config::Targets;

/// Response header telling whether a thumbnail came from the relay cache
pub const RELAY_CACHE_HEADER: HeaderName = HeaderName::from_static("x-relay-cache");

/// ANY /api/* - Relay a request to the backend
pub async fn proxy_request(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    // Checked before method dispatch: a misconfigured relay rejects preflights too
    let targets = state.relay.targets().map_err(|e| {
        tracing::error!("Relay is misconfigured: {}", e);
        ApiError::from(e)
    })?;

    let allow_origin = cors::resolve_origin(
        request.headers().get(header::ORIGIN),
        &targets,
        &state.relay,
    );

    if *request.method() == Method::OPTIONS {
        return Ok(cors::preflight_response(&allow_origin));
    }

    let mut response = match forward(&state, &targets, request).await {
        Ok(response) => response,
        Err(e) => ApiError::from(e).into_response(),
    };
    cors::apply_cors_headers(response.headers_mut(), &allow_origin);

    Ok(response)
}

/// Send the request to the backend and turn its answer into a response
async fn forward(
    state: &AppState,
    targets: &Targets,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = request_path_and_query(&parts);
    let thumbnail = headers::is_thumbnail_path(parts.uri.path(), &state.relay.thumbnail_prefix);

    // Only plain thumbnail GETs go through the cache; ranged and conditional
    // requests get answers that must not be replayed to other clients
    let cacheable = thumbnail
        && parts.method == Method::GET
        && !is_partial_or_conditional(&parts.headers);
    let cache = state.thumbnails.as_ref().filter(|_| cacheable);

    if let Some(cache) = cache {
        if let Some(hit) = cache.get(&path_and_query).await {
            tracing::debug!("Thumbnail cache hit: {}", path_and_query);
            return Ok(cached_response(&hit));
        }
    }

    let target = targets.backend_target(&path_and_query);
    let outbound_headers = headers::outbound_request_headers(
        &parts.headers,
        &state.relay.platform_header_prefixes,
        &targets.backend_host,
    );

    let mut request_builder = state
        .client
        .request(parts.method.clone(), target.as_str())
        .headers(outbound_headers.clone());

    if !matches!(parts.method, Method::GET | Method::HEAD) {
        let body = axum::body::to_bytes(body, state.relay.max_body_bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to read request body for {} {}: {}", parts.method, target, e);
                ProxyError::ReadBody(e)
            })?;
        request_builder = request_builder.body(body);
    }

    tracing::debug!("Relaying {} {}", parts.method, target);

    let upstream = request_builder.send().await.map_err(|e| {
        tracing::error!(
            target_url = %target,
            headers = ?headers::redacted(&outbound_headers),
            "Failed to proxy request: {}",
            e
        );
        ProxyError::Upstream(e)
    })?;

    let status = upstream.status();
    let mut relayed_headers = headers::relayed_response_headers(upstream.headers());
    if thumbnail {
        headers::force_thumbnail_cache_control(&mut relayed_headers);
    }

    if let Some(cache) = cache {
        relayed_headers.insert(RELAY_CACHE_HEADER, HeaderValue::from_static("MISS"));

        let storable = status == StatusCode::OK
            && upstream.content_length().is_some_and(|len| cache.admits(len));

        if storable {
            // Buffer so the same bytes can be cached and relayed
            let bytes = upstream.bytes().await.map_err(|e| {
                tracing::error!(target_url = %target, "Failed to read thumbnail: {}", e);
                ProxyError::ReadResponse(e)
            })?;

            let mut cached_headers = relayed_headers.clone();
            cached_headers.remove(RELAY_CACHE_HEADER);
            cache
                .insert(
                    path_and_query,
                    CachedThumbnail {
                        status,
                        headers: cached_headers,
                        body: bytes.clone(),
                    },
                )
                .await;

            return Ok(build_response(status, relayed_headers, Body::from(bytes)));
        }
    }

    Ok(build_response(
        status,
        relayed_headers,
        Body::from_stream(upstream.bytes_stream()),
    ))
}

/// Requests whose backend answer depends on client validators or ranges
fn is_partial_or_conditional(headers: &HeaderMap) -> bool {
    [
        header::RANGE,
        header::IF_RANGE,
        header::IF_NONE_MATCH,
        header::IF_MODIFIED_SINCE,
    ]
    .iter()
    .any(|name| headers.contains_key(name))
}

/// Path plus query string as received, e.g. `/api/blogs/?page=2`
fn request_path_and_query(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string())
}

fn cached_response(hit: &CachedThumbnail) -> Response {
    let mut relayed = hit.headers.clone();
    headers::force_thumbnail_cache_control(&mut relayed);
    relayed.insert(RELAY_CACHE_HEADER, HeaderValue::from_static("HIT"));
    build_response(hit.status, relayed, Body::from(hit.body.clone()))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
