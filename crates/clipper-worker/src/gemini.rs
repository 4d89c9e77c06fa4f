//! Gemini client for video analysis.
//!
//! The video is uploaded through the Files API (resumable protocol), polled
//! until the service has processed it, analyzed with `generateContent`, and
//! deleted again. Model names are tried in order; only a missing model
//! moves on to the next one.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisClient;
use crate::error::{AnalysisError, PipelineError, PipelineResult};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODELS: [&str; 3] = ["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Analysis service settings. Loaded once by the binary.
#[derive(Clone)]
pub struct AnalysisConfig {
    pub api_key: String,
    /// Models to try, in order
    pub models: Vec<String>,
    pub base_url: String,
    /// Timeout for metadata and generate requests
    pub request_timeout: Duration,
    /// Timeout for the upload body transfer
    pub upload_timeout: Duration,
    /// Delay between file state polls
    pub poll_interval: Duration,
    /// Polls before giving up on a file stuck in PROCESSING
    pub max_polls: u32,
}

impl AnalysisConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(900),
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
        }
    }

    /// Load from `GEMINI_API_KEY` and `CLIPPER_GEMINI_*`.
    pub fn from_env() -> PipelineResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::config("GEMINI_API_KEY not set"))?;

        let mut config = Self::new(api_key.trim());
        if let Ok(models) = std::env::var("CLIPPER_GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        if let Ok(url) = std::env::var("CLIPPER_GEMINI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = std::env::var("CLIPPER_GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("CLIPPER_GEMINI_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.poll_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &"<redacted>")
            .field("models", &self.models)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("upload_timeout", &self.upload_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}

/// A file stored by the Files API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini API client.
pub struct GeminiClient {
    config: AnalysisConfig,
    http: Client,
}

impl GeminiClient {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.config.base_url, path)
    }

    async fn upload(&self, video: &Path) -> Result<RemoteFile, AnalysisError> {
        let size = tokio::fs::metadata(video).await?.len();
        let mime = mime_type_for(video);
        let display_name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.config.base_url))
            .query(&[("key", self.config.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime)
            .timeout(self.config.request_timeout)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::Service("upload session has no upload URL".into()))?;

        debug!("Uploading {} ({} bytes, {})", video.display(), size, mime);
        let file = tokio::fs::File::open(video).await?;
        let response = self
            .http
            .post(upload_url)
            .header(CONTENT_LENGTH, size)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .timeout(self.config.upload_timeout)
            .body(reqwest::Body::from(file))
            .send()
            .await?;
        let uploaded: UploadResponse = ensure_success(response).await?.json().await?;

        info!("Uploaded {} as {}", video.display(), uploaded.file.name);
        Ok(uploaded.file)
    }

    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, AnalysisError> {
        for _ in 0..self.config.max_polls {
            match file.state.as_deref() {
                Some("ACTIVE") | None => return Ok(file),
                Some("FAILED") => {
                    return Err(AnalysisError::FileProcessing(format!(
                        "{} entered state FAILED",
                        file.name
                    )))
                }
                Some(state) => {
                    debug!("File {} is {}, waiting", file.name, state);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
            let response = self
                .http
                .get(self.api_url(&file.name))
                .query(&[("key", self.config.api_key.as_str())])
                .timeout(self.config.request_timeout)
                .send()
                .await?;
            file = ensure_success(response).await?.json().await?;
        }
        Err(AnalysisError::FileProcessing(format!(
            "{} still processing after {} polls",
            file.name, self.config.max_polls
        )))
    }

    async fn generate(
        &self,
        model: &str,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<String, AnalysisError> {
        let mime = file.mime_type.as_deref().unwrap_or("video/mp4");
        let body = json!({
            "contents": [{
                "parts": [
                    { "file_data": { "mime_type": mime, "file_uri": file.uri } },
                    { "text": prompt }
                ]
            }],
            "generationConfig": GenerationConfig { response_mime_type: "application/json" },
        });

        let response = self
            .http
            .post(self.api_url(&format!("models/{}:generateContent", model)))
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateResponse = ensure_success(response).await?.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(text)
    }

    /// Handle that deletes `file` from the service, even if the analysis
    /// future is dropped before it finishes.
    fn remote_handle(&self, file: &RemoteFile) -> UploadedFile {
        UploadedFile {
            http: self.http.clone(),
            url: self.api_url(&file.name),
            api_key: self.config.api_key.clone(),
            timeout: self.config.request_timeout,
            name: file.name.clone(),
            deleted: false,
        }
    }

    async fn generate_with_fallback(
        &self,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<String, AnalysisError> {
        let mut last_error = None;
        for model in &self.config.models {
            info!("Attempting Gemini API with model: {}", model);
            match self.generate(model, file, prompt).await {
                Ok(text) => {
                    info!("Got analysis from {}", model);
                    return Ok(text);
                }
                Err(AnalysisError::ModelNotFound(msg)) => {
                    warn!("Model {} not available: {}", model, msg);
                    last_error = Some(AnalysisError::ModelNotFound(format!("{}: {}", model, msg)));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| AnalysisError::ModelNotFound("no models configured".into())))
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(&self, video: &Path, prompt: &str) -> Result<String, AnalysisError> {
        let file = self.upload(video).await?;
        let remote = self.remote_handle(&file);
        let result = match self.wait_until_active(file).await {
            Ok(active) => self.generate_with_fallback(&active, prompt).await,
            Err(e) => Err(e),
        };
        remote.delete().await;
        result
    }
}

/// An uploaded file awaiting deletion.
///
/// Dropping it without calling [`UploadedFile::delete`] (a cancelled run)
/// schedules the delete on the current runtime instead.
struct UploadedFile {
    http: Client,
    url: String,
    api_key: String,
    timeout: Duration,
    name: String,
    deleted: bool,
}

impl UploadedFile {
    async fn delete(mut self) {
        self.deleted = true;
        delete_remote(&self.http, &self.url, &self.api_key, self.timeout, &self.name).await;
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to delete remote file {}; it will expire on its own", self.name);
            return;
        };
        info!("Analysis abandoned, deleting remote file {} in the background", self.name);
        let http = self.http.clone();
        let url = std::mem::take(&mut self.url);
        let api_key = std::mem::take(&mut self.api_key);
        let name = std::mem::take(&mut self.name);
        let timeout = self.timeout;
        runtime.spawn(async move {
            delete_remote(&http, &url, &api_key, timeout, &name).await;
        });
    }
}

async fn delete_remote(http: &Client, url: &str, api_key: &str, timeout: Duration, name: &str) {
    let result = http
        .delete(url)
        .query(&[("key", api_key)])
        .timeout(timeout)
        .send()
        .await;
    match result {
        Ok(r) if r.status().is_success() => debug!("Deleted remote file {}", name),
        Ok(r) => warn!("Failed to delete remote file {}: {}", name, r.status()),
        Err(e) => warn!("Failed to delete remote file {}: {}", name, e),
    }
}

/// Map a non-success response to an [`AnalysisError`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> AnalysisError {
    let detail = format!("{}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AnalysisError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AnalysisError::Quota(detail),
        _ if body.contains("RESOURCE_EXHAUSTED") => AnalysisError::Quota(detail),
        StatusCode::NOT_FOUND => AnalysisError::ModelNotFound(detail),
        _ if status == StatusCode::BAD_REQUEST && body.contains("API_KEY_INVALID") => {
            AnalysisError::Auth(detail)
        }
        _ => AnalysisError::Service(detail),
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(StatusCode::FORBIDDEN, ""), AnalysisError::Auth(_)));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AnalysisError::Quota(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"status": "RESOURCE_EXHAUSTED"}"#),
            AnalysisError::Quota(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"reason": "API_KEY_INVALID"}"#),
            AnalysisError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            AnalysisError::ModelNotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            AnalysisError::Service(_)
        ));
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(mime_type_for(Path::new("proxy.mp4")), "video/mp4");
        assert_eq!(mime_type_for(Path::new("noext")), "video/mp4");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AnalysisConfig::new("secret-key");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("gemini-2.5-flash"));
    }
}
