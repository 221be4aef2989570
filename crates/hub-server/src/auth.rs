//! Bearer-token auth middleware for the `/api` surface (§4.10, §7).
//!
//! All routes except `/health` require `Authorization: Bearer <token>` or,
//! for WebSocket upgrades that can't set headers, `?token=<token>`. Token
//! comparison is constant-time to avoid leaking the token via timing.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

fn tokens_match(expected: &str, provided: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(expected.as_bytes(), provided.as_bytes()).is_ok()
}

fn unauthorized() -> Response {
    let mut resp = (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"ok": false, "error": "unauthorized"})),
    )
        .into_response();
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
    resp
}

/// Axum middleware that checks for a valid auth token. Skips `/health`.
pub async fn auth_middleware(
    State(expected_token): State<String>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/health" {
        return next.run(req).await;
    }

    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = auth_header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if tokens_match(&expected_token, token) {
                    return next.run(req).await;
                }
            }
        }
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                if tokens_match(&expected_token, token) {
                    return next.run(req).await;
                }
            }
        }
    }

    unauthorized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tokens_compare_equal() {
        assert!(tokens_match("abc123", "abc123"));
    }

    #[test]
    fn mismatched_tokens_compare_unequal() {
        assert!(!tokens_match("abc123", "abc124"));
    }

    #[test]
    fn different_length_tokens_compare_unequal() {
        assert!(!tokens_match("abc123", "abc1234"));
    }
}
