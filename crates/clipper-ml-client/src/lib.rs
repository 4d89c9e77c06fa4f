//! Client for the face detection service.
//!
//! The service receives single JPEG frames and returns face boxes. The
//! client implements [`clipper_media::FaceDetector`] so it plugs straight
//! into vertical reframing.

pub mod client;
pub mod error;
pub mod types;

pub use client::{FaceServiceClient, FaceServiceConfig};
pub use error::{MlError, MlResult};
pub use types::{DetectRequest, DetectResponse, DetectedFace};
