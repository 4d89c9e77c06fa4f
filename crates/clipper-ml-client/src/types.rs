//! Face service request/response types.

use serde::{Deserialize, Serialize};

/// One frame to run detection on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Base64-encoded JPEG
    pub image: String,
    pub width: u32,
    pub height: u32,
    /// Faces below this score may be dropped server-side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

/// A face box as returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(alias = "score")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
    /// Coordinates are fractions of the frame size instead of pixels
    #[serde(default)]
    pub normalized: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
