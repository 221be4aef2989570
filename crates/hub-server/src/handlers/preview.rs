//! Preview proxy (§6/§12 "Preview proxy"): reverse-proxies a drone's exposed
//! container port to the browser, stripping headers that would otherwise
//! prevent the upstream app from being framed inside the hub UI.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::app_state::SharedState;
use crate::error::ApiError;

const STRIPPED_RESPONSE_HEADERS: &[&str] = &["x-frame-options", "content-security-policy"];

/// `ANY /drones/:id/preview/:containerPort/*rest`: maps `containerPort` to
/// the container's published host port (via `ContainerAdapter::ports`) and
/// forwards the request to `http://localhost:<hostPort>/<rest>`.
pub async fn proxy(
    State(state): State<SharedState>,
    Path((id, container_port, rest)): Path<(String, u16, String)>,
    req: axum::extract::Request,
) -> Result<Response, ApiError> {
    let reg = state.registry.load();
    let drone = super::require_live_drone(&reg, &id)?;

    let ports = state.container.ports(&drone.container_name).await?;
    let host_port = ports
        .iter()
        .find(|p| p.container_port == container_port)
        .map(|p| p.host_port)
        .ok_or_else(|| ApiError::NotFound(format!("container port {container_port} is not published")))?;

    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let target = format!("http://localhost:{host_port}/{rest}{query}");

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let client = reqwest::Client::new();
    let upstream = client
        .request(method, &target)
        .body(body_bytes)
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("preview upstream unreachable: {e}")))?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        let lower = name.as_str().to_ascii_lowercase();
        if STRIPPED_RESPONSE_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        if let Ok(header_name) = HeaderName::from_bytes(name.as_str().as_bytes()) {
            headers.insert(header_name, value.clone());
        }
    }

    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::Upstream(format!("preview upstream read failed: {e}")))?;

    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    Ok(resp.into_response())
}
