//! Error taxonomy for the container and daemon boundaries (§4.3, §4.4, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("container not found: {0}")]
    MissingContainer(String),
    #[error("container not running: {0}")]
    NotRunning(String),
    #[error("container already running: {0}")]
    AlreadyRunning(String),
    #[error("repo unavailable: {0}")]
    RepoUnavailable(String),
    #[error("daemon out of date, needs upgrade")]
    DaemonStale,
    #[error("daemon unauthorized")]
    Unauthorized,
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// Classify a raw stderr/message string the way the container CLI's error
/// text is classified into the §4.3 buckets.
pub fn classify_container_message(msg: &str) -> Option<ConnectorError> {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("not found") {
        return Some(ConnectorError::MissingContainer(msg.to_string()));
    }
    if lower.contains("not running") {
        return Some(ConnectorError::NotRunning(msg.to_string()));
    }
    if lower.contains("already running") || lower.contains("already exists") {
        return Some(ConnectorError::AlreadyRunning(msg.to_string()));
    }
    if lower.contains("not a git repository") || lower.contains("cannot change to") {
        return Some(ConnectorError::RepoUnavailable(msg.to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_container() {
        assert!(matches!(
            classify_container_message("Error: No such container: foo"),
            Some(ConnectorError::MissingContainer(_))
        ));
    }

    #[test]
    fn classifies_repo_unavailable() {
        assert!(matches!(
            classify_container_message("fatal: not a git repository (or any of the parent directories)"),
            Some(ConnectorError::RepoUnavailable(_))
        ));
    }

    #[test]
    fn unclassified_message_returns_none() {
        assert!(classify_container_message("some other failure").is_none());
    }
}
