//! Face service client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Face service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::ServiceUnavailable(_) => true,
            MlError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<MlError> for clipper_media::MediaError {
    fn from(e: MlError) -> Self {
        clipper_media::MediaError::detection_failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(MlError::ServiceUnavailable("503".into()).is_retryable());
        assert!(!MlError::RequestFailed("400".into()).is_retryable());
        assert!(!MlError::InvalidResponse("bad".into()).is_retryable());
    }

    #[test]
    fn test_into_media_error() {
        let media: clipper_media::MediaError = MlError::RequestFailed("400".into()).into();
        assert!(matches!(media, clipper_media::MediaError::DetectionFailed(_)));
    }
}
