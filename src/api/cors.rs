//! CORS negotiation
//!
//! The relay answers with exactly one `Access-Control-Allow-Origin` value:
//! the request's own `Origin` when it is on the allow-list, otherwise the
//! configured frontend URL. tower-http's `CorsLayer` cannot express that
//! fallback, so the headers are set by hand.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};

use crate::config::{RelayConfig, Targets};

pub const ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type,Authorization";
/// Preflight cache lifetime in seconds
pub const MAX_AGE: &str = "86400";

/// Pick the `Access-Control-Allow-Origin` value for a request
pub fn resolve_origin(
    request_origin: Option<&HeaderValue>,
    targets: &Targets,
    relay: &RelayConfig,
) -> HeaderValue {
    if relay.forces_frontend_origin() {
        return targets.frontend_origin.clone();
    }

    match request_origin {
        Some(origin) if origin_allowed(origin, &relay.allowed_origins) => origin.clone(),
        _ => targets.frontend_origin.clone(),
    }
}

/// Whether an `Origin` header value matches an allow-list entry
pub fn origin_allowed(origin: &HeaderValue, allowed: &[String]) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let origin = origin.to_ascii_lowercase();
    allowed
        .iter()
        .any(|pattern| glob_matches(&pattern.to_ascii_lowercase(), &origin))
}

/// Glob match where `*` spans any run of characters and `?` exactly one.
///
/// Iterative with a single backtrack point; stack use does not depend on the
/// value length.
fn glob_matches(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut pi, mut vi) = (0, 0);
    // Position of the last `*` seen and the value index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < value.len() {
        match pattern.get(pi) {
            Some('*') => {
                backtrack = Some((pi, vi));
                pi += 1;
            }
            Some('?') => {
                pi += 1;
                vi += 1;
            }
            Some(&c) if c == value[vi] => {
                pi += 1;
                vi += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    vi = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

/// Set the CORS headers sent on every relayed response
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    // The allowed origin depends on the request's Origin header
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

/// Empty 204 answer to an `OPTIONS` preflight
pub fn preflight_response(origin: &HeaderValue) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors_headers(headers, origin);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));
    response
}
