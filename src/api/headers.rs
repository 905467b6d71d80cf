//! Header rewriting between the browser and the backend

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// `Cache-Control` forced onto thumbnail responses (24 hours)
pub const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=86400";

/// Connection-scoped headers that never cross the relay
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Header values replaced in log output
const SENSITIVE: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Extra hop-by-hop headers named by the message's own `Connection` header
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// Headers sent to the backend.
///
/// Inbound headers are copied except platform-injected ones (matched by
/// prefix), hop-by-hop headers (including those listed in `Connection`) and
/// `Content-Length`; `Host` is replaced by the backend's host.
pub fn outbound_request_headers(
    inbound: &HeaderMap,
    platform_prefixes: &[String],
    backend_host: &HeaderValue,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    let listed = connection_listed(inbound);

    for (name, value) in inbound {
        // Header names are always lowercase
        let lower = name.as_str();
        if platform_prefixes
            .iter()
            .any(|prefix| lower.starts_with(prefix.to_ascii_lowercase().as_str()))
        {
            continue;
        }
        if is_hop_by_hop(name)
            || listed.contains(name)
            || *name == header::CONTENT_LENGTH
            || *name == header::HOST
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(header::HOST, backend_host.clone());
    headers
}

/// Backend response headers relayed to the browser, minus hop-by-hop headers
pub fn relayed_response_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(backend.len());
    let listed = connection_listed(backend);
    for (name, value) in backend {
        if !is_hop_by_hop(name) && !listed.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Whether a request path falls under the thumbnail sub-route
pub fn is_thumbnail_path(path: &str, thumbnail_prefix: &str) -> bool {
    !thumbnail_prefix.is_empty() && path.starts_with(thumbnail_prefix)
}

/// Replace whatever cache policy the backend sent with the thumbnail one
pub fn force_thumbnail_cache_control(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL),
    );
}

/// Header list for logs with credential values masked
pub fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if SENSITIVE.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.to_string(), shown)
        })
        .collect()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn platform_headers_never_forwarded(
            suffixes in prop::collection::vec("[a-z][a-z0-9-]{0,12}", 1..8),
            value in "[a-zA-Z0-9 ]{0,20}",
        ) {
            let mut inbound = HeaderMap::new();
            for suffix in &suffixes {
                let name = HeaderName::from_bytes(format!("x-vercel-{}", suffix).as_bytes()).unwrap();
                inbound.insert(name, HeaderValue::from_str(&value).unwrap());
            }
            inbound.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

            let host = HeaderValue::from_static("backend.example");
            let headers = outbound_request_headers(&inbound, &["x-vercel-".to_string()], &host);

            prop_assert!(headers.keys().all(|name| !name.as_str().starts_with("x-vercel-")));
            prop_assert_eq!(headers.len(), 2);
            prop_assert_eq!(&headers[header::HOST], "backend.example");
        }
    }
}
