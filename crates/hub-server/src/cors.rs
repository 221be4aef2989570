//! CORS allow-list: exact `scheme://host` origin matches only (§4.10).
//!
//! `tower_http::cors::CorsLayer` speaks in predicates, so the allow-list is
//! implemented as a small predicate closure rather than the crate's
//! `Any`/exact-origin list helpers, which don't expose per-request 403 on
//! rejection the way this surface requires.

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn layer(allowed_origins: Vec<String>) -> CorsLayer {
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _request_parts| {
        origin
            .to_str()
            .map(|o| allowed_origins.iter().any(|allowed| allowed == o))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .vary([axum::http::header::ORIGIN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_layer_without_panicking() {
        let _ = layer(vec!["https://app.example.com".to_string()]);
    }
}
