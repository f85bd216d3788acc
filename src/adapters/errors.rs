use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;

/// Errors every backend adapter reports through the common contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("package {name} version {version} already exists")]
    VersionExists { name: String, version: String },
    #[error("operation not supported by {adapter}: {operation}")]
    OperationNotSupported {
        adapter: String,
        operation: &'static str,
    },
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("backend connection failed: {0}")]
    ConnectionFailed(String),
    #[error("backend authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("content too large: {size} bytes exceeds limit of {max} bytes")]
    ContentTooLarge { size: usize, max: usize },
    #[error("operation cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

impl AdapterError {
    pub fn deployment_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "deployment",
            id: id.into(),
        }
    }

    pub fn package_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "package",
            id: id.into(),
        }
    }

    pub fn not_supported(adapter: impl Into<String>, operation: &'static str) -> Self {
        Self::OperationNotSupported {
            adapter: adapter.into(),
            operation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Input validation failures, raised before any backend I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. } | Self::InvalidPath { .. } | Self::InvalidInput(_)
        )
    }
}

impl ResponseError for AdapterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::OperationNotSupported { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::InvalidName { .. } | Self::InvalidPath { .. } | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match status {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::NOT_IMPLEMENTED => "Operation not implemented",
            StatusCode::BAD_REQUEST => "Bad request",
            _ => "Internal error",
        };

        HttpResponse::build(status).json(json!({
            "error": message,
            "details": self.to_string(),
        }))
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::AuthenticationFailed(err.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut => Self::ConnectionFailed(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(
            AdapterError::deployment_not_found("web").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AdapterError::not_supported("overlay", "rollback").status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            AdapterError::InvalidName {
                name: "-app".to_string(),
                reason: "leading hyphen".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdapterError::ConnectionFailed("refused".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_names_the_subject() {
        let msg = AdapterError::package_not_found("abc").to_string();
        assert!(msg.contains("package"), "Expected kind in: {msg}");
        assert!(msg.contains("abc"), "Expected id in: {msg}");
    }
}
