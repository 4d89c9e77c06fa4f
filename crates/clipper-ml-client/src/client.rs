//! Face service HTTP client.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use clipper_media::reframe::{BoundingBox, FaceBox, FaceDetector};
use clipper_media::MediaResult;

use crate::error::{MlError, MlResult};
use crate::types::{DetectRequest, DetectResponse, HealthResponse};

/// Configuration for the face service client.
#[derive(Debug, Clone)]
pub struct FaceServiceConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub max_retries: u32,
    /// JPEG quality for uploaded frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for FaceServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            jpeg_quality: 85,
        }
    }
}

impl FaceServiceConfig {
    /// Build from `CLIPPER_FACE_SERVICE_*` variables.
    ///
    /// Returns `None` when no service URL is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CLIPPER_FACE_SERVICE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let defaults = Self::default();
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(
                std::env::var("CLIPPER_FACE_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
            max_retries: std::env::var("CLIPPER_FACE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            jpeg_quality: defaults.jpeg_quality,
        })
    }
}

/// HTTP face detector.
pub struct FaceServiceClient {
    http: Client,
    config: FaceServiceConfig,
}

impl FaceServiceClient {
    pub fn new(config: FaceServiceConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        Ok(Self { http, config })
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "healthy" || h.status == "ok")
                .unwrap_or(false),
            Ok(response) => {
                warn!("Face service health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Face service health check error: {}", e);
                false
            }
        }
    }

    /// Detect faces in `frame`; boxes are in the frame's pixel space.
    pub async fn detect_faces(&self, frame: &RgbImage) -> MlResult<Vec<FaceBox>> {
        let request = DetectRequest {
            image: encode_jpeg(frame, self.config.jpeg_quality)?,
            width: frame.width(),
            height: frame.height(),
            min_confidence: None,
        };
        let url = format!("{}/detect", self.config.base_url);

        let response: DetectResponse = self.with_retry(|| self.post_detect(&url, &request)).await?;
        debug!("Face service returned {} faces", response.faces.len());

        let (sx, sy) = if response.normalized {
            (frame.width() as f64, frame.height() as f64)
        } else {
            (1.0, 1.0)
        };
        Ok(response
            .faces
            .iter()
            .map(|f| FaceBox::new(BoundingBox::new(f.x, f.y, f.width, f.height).scale(sx, sy), f.confidence))
            .filter(|f| f.bbox.is_valid())
            .collect())
    }

    async fn post_detect(&self, url: &str, request: &DetectRequest) -> MlResult<DetectResponse> {
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| MlError::InvalidResponse(e.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(MlError::ServiceUnavailable(format!("{}: {}", status, body)))
        } else {
            Err(MlError::RequestFailed(format!("{}: {}", status, body)))
        }
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(
                        "Face service request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FaceDetector for FaceServiceClient {
    async fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<FaceBox>> {
        Ok(self.detect_faces(frame).await?)
    }

    fn name(&self) -> &'static str {
        "face-service"
    }
}

fn encode_jpeg(frame: &RgbImage, quality: u8) -> MlResult<String> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(BASE64.encode(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = FaceServiceConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_encode_jpeg_roundtrips_dimensions() {
        let frame = RgbImage::from_pixel(32, 16, image::Rgb([200, 10, 10]));
        let encoded = encode_jpeg(&frame, 90).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }
}
