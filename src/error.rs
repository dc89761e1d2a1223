use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
#[allow(dead_code)]
pub enum ProbeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    #[error("resolver query failed: {0}")]
    ResolverQuery(String),

    #[error("health check failed: {0}")]
    HealthCheck(String),

    #[error("HTTP probe failed: {0}")]
    HttpProbe(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ProbeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProbeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProbeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProbeError::DnsResolution(_)
            | ProbeError::ResolverQuery(_)
            | ProbeError::HealthCheck(_)
            | ProbeError::HttpProbe(_)
            | ProbeError::Io(_)
            | ProbeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_400() {
        let response = ProbeError::InvalidInput("domain parameter is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_probe_failure_maps_to_500() {
        let response = ProbeError::HttpProbe("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let response = ProbeError::Timeout("fan-out deadline".into()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_error_display_includes_cause() {
        let err = ProbeError::DnsResolution("no such host".into());
        assert_eq!(err.to_string(), "DNS resolution failed: no such host");
    }
}
