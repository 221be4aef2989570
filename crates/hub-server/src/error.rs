//! `ApiError` (§7, §11.1): the single error type that crosses the HTTP
//! boundary. Renders to the canonical `{ok:false, error, code?}` body with
//! the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use drone_hub_connector_core::error::ConnectorError;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("drone is still starting")]
    StillStarting,
    #[error("{message}")]
    Conflict { code: &'static str, message: String, conflict_files: Option<Vec<String>> },
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
            conflict_files: None,
        }
    }

    pub fn conflict_with_files(
        code: &'static str,
        message: impl Into<String>,
        conflict_files: Vec<String>,
    ) -> Self {
        ApiError::Conflict {
            code,
            message: message.into(),
            conflict_files: Some(conflict_files),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StillStarting => StatusCode::CONFLICT,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::Conflict { code, .. } => Some(code),
            _ => None,
        }
    }

    fn conflict_files(&self) -> Option<Vec<String>> {
        match self {
            ApiError::Conflict { conflict_files, .. } => conflict_files.clone(),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = drone_hub_protocol::api::ErrorBody {
            error: self.to_string(),
            code: self.code().map(str::to_string),
            conflict_files: self.conflict_files(),
        };
        (status, Json(serde_json::json!({"ok": false, "error": body.error, "code": body.code, "conflictFiles": body.conflict_files}))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Classify connector-layer errors into the §7 HTTP taxonomy.
impl From<ConnectorError> for ApiError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::MissingContainer(m) => ApiError::NotFound(m),
            ConnectorError::NotRunning(m) => ApiError::conflict("not_running", m),
            ConnectorError::AlreadyRunning(m) => ApiError::conflict("already_running", m),
            ConnectorError::RepoUnavailable(m) => ApiError::conflict("repo_unavailable", m),
            ConnectorError::Unauthorized => ApiError::Unauthorized,
            ConnectorError::DaemonStale => ApiError::Internal("daemon out of date".to_string()),
            ConnectorError::Timeout(ms) => ApiError::Internal(format!("timed out after {ms}ms")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound("drone d1".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn still_starting_maps_to_409() {
        assert_eq!(ApiError::StillStarting.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn conflict_carries_code_and_files() {
        let err = ApiError::conflict_with_files("host_conflicts_ready", "merge conflict", vec!["a.txt".to_string()]);
        assert_eq!(err.code(), Some("host_conflicts_ready"));
        assert_eq!(err.conflict_files(), Some(vec!["a.txt".to_string()]));
    }
}
