use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::DetectionError;

/// Failures of the `/detect-face` endpoint.
#[derive(Debug)]
pub enum ApiError {
    Detection(DetectionError),
    MissingFile,
    /// Multipart read failure with the status axum assigned to it.
    Upload(StatusCode, String),
}

impl From<DetectionError> for ApiError {
    fn from(e: DetectionError) -> Self {
        ApiError::Detection(e)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detection(DetectionError::UnsupportedFormat(_)) => {
                write!(f, "Invalid image type. Use jpg, jpeg, or png.")
            }
            Self::Detection(DetectionError::EmptyPayload) => write!(f, "Empty image file"),
            Self::Detection(DetectionError::InvalidImageData) => write!(f, "Invalid image data"),
            Self::Detection(DetectionError::Internal(_)) => write!(f, "Face detection failed"),
            Self::MissingFile => write!(f, "Missing upload field \"file\""),
            Self::Upload(_, msg) => write!(f, "Failed to read upload: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Detection(e) if !e.is_client_error() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload(status, _) => *status,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Detection(DetectionError::Internal(e)) => tracing::error!("face detection failed: {e:#}"),
            other => tracing::warn!("rejected upload: {other}"),
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(DetectionError::UnsupportedFormat("gif".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(DetectionError::EmptyPayload), StatusCode::BAD_REQUEST),
            (ApiError::from(DetectionError::InvalidImageData), StatusCode::BAD_REQUEST),
            (ApiError::MissingFile, StatusCode::BAD_REQUEST),
            (
                ApiError::Upload(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::from(DetectionError::Internal(anyhow::anyhow!("boom"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ApiError::from(DetectionError::Internal(anyhow::anyhow!("connection refused 10.0.0.3")));
        assert_eq!(err.to_string(), "Face detection failed");
    }
}
