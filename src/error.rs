use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Which external collaborator an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Directory,
    Metrics,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Upstream::Directory => "directory",
            Upstream::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Could not reach {service} service: {reason}")]
    UpstreamUnavailable { service: Upstream, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn upstream(service: Upstream, reason: impl Into<String>) -> Self {
        MonitorError::UpstreamUnavailable {
            service,
            reason: reason.into(),
        }
    }

    /// Stable identifier used in response bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::InvalidInput(_) => "invalid_input",
            MonitorError::InstanceNotFound(_) => "instance_not_found",
            MonitorError::UpstreamUnavailable { .. } => "upstream_unavailable",
            MonitorError::Config(_) => "config",
            MonitorError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MonitorError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            MonitorError::Config(_) | MonitorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Upstream detail is for operators, not callers.
        let error_message = match &self {
            MonitorError::UpstreamUnavailable { service, .. } => {
                format!("Failed to fetch data from the {} service", service)
            }
            MonitorError::Config(_) | MonitorError::Internal(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
