//! License plate recognition client.

use crate::transport::{ServiceRequest, ServiceResponse, ServiceTransport};
use parkgate_core::PlateNumber;
use parkgate_core::constants::{
    DEFAULT_PLATE_FIELD, DEFAULT_RECOGNITION_TIMEOUT_MS, DEFAULT_RECOGNITION_URL,
    DEFAULT_UPLOAD_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Field names accepted after the configured one.
const FALLBACK_PLATE_FIELDS: [&str; 2] = ["plate_text", "text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub url: String,
    pub timeout: Duration,
    /// Multipart field carrying the image.
    pub upload_field: String,
    /// Top-level response field holding the plate text.
    pub plate_field: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RECOGNITION_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_RECOGNITION_TIMEOUT_MS),
            upload_field: DEFAULT_UPLOAD_FIELD.to_string(),
            plate_field: DEFAULT_PLATE_FIELD.to_string(),
        }
    }
}

impl RecognitionConfig {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upload_field(mut self, field: impl Into<String>) -> Self {
        self.upload_field = field.into();
        self
    }

    pub fn plate_field(mut self, field: impl Into<String>) -> Self {
        self.plate_field = field.into();
        self
    }
}

/// Outcome of one recognition request.
///
/// `plate` is set only on success; `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub plate: Option<PlateNumber>,
    /// Parsed response body, when it was JSON.
    pub raw: Option<Value>,
    /// HTTP status; `None` when no response was received.
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl RecognitionResult {
    fn failed(error: impl Into<String>, started: Instant) -> Self {
        Self {
            plate: None,
            raw: None,
            status: None,
            latency_ms: elapsed_ms(started),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.plate.is_some()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Uploads frames to the recognition service.
#[derive(Debug, Clone)]
pub struct RecognitionClient<T> {
    transport: T,
    config: RecognitionConfig,
}

impl<T: ServiceTransport> RecognitionClient<T> {
    pub fn new(transport: T, config: RecognitionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Upload the frame at `frame_path` and extract the plate.
    ///
    /// Never retries. A non-2xx status, a transport failure, a malformed
    /// body or a missing/empty plate all produce a result without a plate.
    pub async fn recognize(&self, frame_path: &Path) -> RecognitionResult {
        let started = Instant::now();

        let data = match tokio::fs::read(frame_path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %frame_path.display(), error = %e, "Cannot read frame");
                return RecognitionResult::failed(
                    format!("cannot read {}: {e}", frame_path.display()),
                    started,
                );
            }
        };

        let file_name = frame_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.jpg".to_string());

        let request = ServiceRequest::post_file(
            &self.config.url,
            self.config.timeout,
            &self.config.upload_field,
            file_name,
            "image/jpeg",
            data,
        );

        debug!(url = %self.config.url, path = %frame_path.display(), "Submitting frame");

        let response = match self.transport.submit(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "Recognition request failed");
                return RecognitionResult::failed(e.to_string(), started);
            }
        };

        let result = self.interpret(&response, started);
        match (&result.plate, &result.error) {
            (Some(plate), _) => info!(
                plate = %plate,
                status = response.status,
                latency_ms = result.latency_ms,
                "Plate recognized"
            ),
            (None, Some(error)) => warn!(
                status = response.status,
                latency_ms = result.latency_ms,
                error = %error,
                "Recognition failed"
            ),
            (None, None) => {}
        }
        result
    }

    fn interpret(&self, response: &ServiceResponse, started: Instant) -> RecognitionResult {
        let mut result = RecognitionResult {
            plate: None,
            raw: None,
            status: Some(response.status),
            latency_ms: elapsed_ms(started),
            error: None,
        };

        let body = response.json::<Value>();

        if !response.is_success() {
            result.raw = body.ok();
            result.error = Some(format!("HTTP {}", response.status));
            return result;
        }

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        match self.extract_plate(&body) {
            Ok(plate) => result.plate = Some(plate),
            Err(error) => result.error = Some(error),
        }
        result.raw = Some(body);
        result
    }

    fn extract_plate(&self, body: &Value) -> std::result::Result<PlateNumber, String> {
        let Some(object) = body.as_object() else {
            return Err("response is not a JSON object".to_string());
        };

        let text = std::iter::once(self.config.plate_field.as_str())
            .chain(FALLBACK_PLATE_FIELDS)
            .find_map(|field| object.get(field).and_then(Value::as_str));

        match text {
            Some(text) => PlateNumber::new(text).map_err(|e| e.to_string()),
            None => Err(format!(
                "no plate in response (field `{}`)",
                self.config.plate_field
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Reply, ScriptedTransport};
    use crate::transport::RequestBody;
    use serde_json::json;

    const URL: &str = "http://ocr.test/v1/recognize";

    fn frame() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        std::fs::write(file.path(), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        file
    }

    fn client(transport: &ScriptedTransport) -> RecognitionClient<ScriptedTransport> {
        RecognitionClient::new(transport.clone(), RecognitionConfig::default().url(URL))
    }

    #[tokio::test]
    async fn test_recognize_normalizes_plate() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"plate": " 12a 3456 ", "confidence": 0.93})));
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert_eq!(result.plate.as_ref().map(PlateNumber::as_str), Some("12A3456"));
        assert_eq!(result.status, Some(200));
        assert!(result.error.is_none());
        assert_eq!(result.raw.unwrap()["confidence"], 0.93);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let RequestBody::Multipart { field, data, mime, .. } = &requests[0].body else {
            panic!("expected multipart upload");
        };
        assert_eq!(field, "file");
        assert_eq!(mime, "image/jpeg");
        assert_eq!(data.as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_recognize_uses_fallback_field() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"plate_text": "34B5678"})));
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert_eq!(result.plate.unwrap().as_str(), "34B5678");
    }

    #[tokio::test]
    async fn test_recognize_custom_fields() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"number": "9Z9999"})));
        let config = RecognitionConfig::default()
            .url(URL)
            .upload_field("image")
            .plate_field("number");
        let frame = frame();

        let result = RecognitionClient::new(transport.clone(), config)
            .recognize(frame.path())
            .await;

        assert!(result.is_success());
        let RequestBody::Multipart { field, .. } = &transport.requests()[0].body else {
            panic!("expected multipart upload");
        };
        assert_eq!(field, "image");
    }

    #[tokio::test]
    async fn test_recognize_http_error() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(500, json!({"detail": "model crashed"})));
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert!(!result.is_success());
        assert_eq!(result.status, Some(500));
        assert_eq!(result.error.as_deref(), Some("HTTP 500"));
        assert_eq!(result.raw.unwrap()["detail"], "model crashed");
    }

    #[tokio::test]
    async fn test_recognize_empty_plate() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"plate": "   "})));
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert!(result.plate.is_none());
        assert!(result.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_recognize_malformed_body() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::text(200, "not json"));
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert!(result.plate.is_none());
        assert!(result.raw.is_none());
        assert!(result.error.unwrap().starts_with("Invalid response"));
    }

    #[tokio::test]
    async fn test_recognize_transport_failure() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::Timeout);
        let frame = frame();

        let result = client(&transport).recognize(frame.path()).await;

        assert!(result.status.is_none());
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_recognize_missing_frame_makes_no_request() {
        let transport = ScriptedTransport::new();

        let result = client(&transport)
            .recognize(Path::new("/nonexistent/frame.jpg"))
            .await;

        assert!(!result.is_success());
        assert_eq!(transport.call_count(), 0);
    }
}
