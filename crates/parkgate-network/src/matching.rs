//! Reservation match client.
//!
//! Request: `POST {"plate": "12A3456", "timestamp": "<rfc3339>"}`.
//! Response: `{"match": bool, "plate"?: string, ...}`; every other field is
//! kept as reservation metadata.

use crate::transport::{ServiceRequest, ServiceResponse, ServiceTransport};
use chrono::{DateTime, SecondsFormat, Utc};
use parkgate_core::PlateNumber;
use parkgate_core::constants::{DEFAULT_MATCH_TIMEOUT_MS, DEFAULT_MATCH_URL};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MATCH_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_MATCH_TIMEOUT_MS),
        }
    }
}

impl MatchConfig {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of one match check.
///
/// `matched` is `true` only for a 2xx response carrying `"match": true`.
/// When the service could not be asked, `failure` says why and `matched` is
/// `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub failure: Option<String>,
    /// Response fields other than `match` and `plate`.
    pub reservation: Option<Value>,
    /// Plate echoed by the service.
    pub plate: Option<String>,
    pub raw: Option<Value>,
    pub status: Option<u16>,
    pub latency_ms: u64,
}

impl MatchResult {
    fn failed(
        failure: impl Into<String>,
        status: Option<u16>,
        raw: Option<Value>,
        started: Instant,
    ) -> Self {
        Self {
            matched: false,
            failure: Some(failure.into()),
            reservation: None,
            plate: None,
            raw,
            status,
            latency_ms: elapsed_ms(started),
        }
    }

    /// Returns `true` if the gate may be opened for this result.
    pub fn allows_entry(&self) -> bool {
        self.matched && self.failure.is_none()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Asks the reservation service whether a plate may enter.
#[derive(Debug, Clone)]
pub struct MatchClient<T> {
    transport: T,
    config: MatchConfig,
}

impl<T: ServiceTransport> MatchClient<T> {
    pub fn new(transport: T, config: MatchConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Check `plate`, seen at `captured_at`, against active reservations.
    pub async fn check_match(
        &self,
        plate: &PlateNumber,
        captured_at: DateTime<Utc>,
    ) -> MatchResult {
        let started = Instant::now();
        let body = json!({
            "plate": plate.as_str(),
            "timestamp": captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let request = ServiceRequest::post_json(&self.config.url, self.config.timeout, body);

        debug!(url = %self.config.url, plate = %plate, "Checking reservation");

        let response = match self.transport.submit(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.config.url, plate = %plate, error = %e, "Match request failed");
                return MatchResult::failed(e.to_string(), None, None, started);
            }
        };

        let result = interpret(&response, started);
        match &result.failure {
            None => info!(
                plate = %plate,
                matched = result.matched,
                status = response.status,
                latency_ms = result.latency_ms,
                "Match checked"
            ),
            Some(failure) => warn!(
                plate = %plate,
                status = response.status,
                failure = %failure,
                "Match check failed"
            ),
        }
        result
    }
}

fn interpret(response: &ServiceResponse, started: Instant) -> MatchResult {
    let status = Some(response.status);
    let body = response.json::<Value>();

    if !response.is_success() {
        return MatchResult::failed(format!("HTTP {}", response.status), status, body.ok(), started);
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => return MatchResult::failed(e.to_string(), status, None, started),
    };

    let Some(object) = body.as_object() else {
        return MatchResult::failed("response is not a JSON object", status, Some(body), started);
    };

    let Some(matched) = object.get("match").and_then(Value::as_bool) else {
        return MatchResult::failed(
            "response has no boolean `match` field",
            status,
            Some(body.clone()),
            started,
        );
    };

    let plate = object.get("plate").and_then(Value::as_str).map(str::to_string);
    let metadata: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "match" | "plate"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let reservation = (!metadata.is_empty()).then_some(Value::Object(metadata));

    MatchResult {
        matched,
        failure: None,
        reservation,
        plate,
        raw: Some(body),
        status,
        latency_ms: elapsed_ms(started),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Reply, ScriptedTransport};
    use crate::transport::RequestBody;
    use chrono::TimeZone;

    const URL: &str = "http://backend.test/api/reservations/match";

    fn client(transport: &ScriptedTransport) -> MatchClient<ScriptedTransport> {
        MatchClient::new(transport.clone(), MatchConfig::default().url(URL))
    }

    fn plate() -> PlateNumber {
        PlateNumber::new("12A3456").unwrap()
    }

    #[tokio::test]
    async fn test_match_true_with_reservation() {
        let transport = ScriptedTransport::new();
        transport.push(
            URL,
            Reply::json(
                200,
                json!({"match": true, "plate": "12A3456", "reservation_id": "r-1", "session": "A"}),
            ),
        );
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        let result = client(&transport).check_match(&plate(), at).await;

        assert!(result.allows_entry());
        assert_eq!(result.plate.as_deref(), Some("12A3456"));
        assert_eq!(
            result.reservation,
            Some(json!({"reservation_id": "r-1", "session": "A"}))
        );

        let RequestBody::Json(body) = &transport.requests()[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(body, &json!({"plate": "12A3456", "timestamp": "2024-05-01T08:30:00.000Z"}));
    }

    #[tokio::test]
    async fn test_match_false() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"match": false})));

        let result = client(&transport).check_match(&plate(), Utc::now()).await;

        assert!(!result.matched);
        assert!(result.failure.is_none());
        assert!(result.reservation.is_none());
        assert!(!result.allows_entry());
    }

    #[tokio::test]
    async fn test_match_true_on_error_status_is_not_trusted() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(503, json!({"match": true})));

        let result = client(&transport).check_match(&plate(), Utc::now()).await;

        assert!(!result.matched);
        assert_eq!(result.failure.as_deref(), Some("HTTP 503"));
        assert_eq!(result.status, Some(503));
    }

    #[tokio::test]
    async fn test_match_missing_flag_is_failure() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::json(200, json!({"matched": "yes"})));

        let result = client(&transport).check_match(&plate(), Utc::now()).await;

        assert!(!result.allows_entry());
        assert!(result.failure.unwrap().contains("match"));
    }

    #[tokio::test]
    async fn test_match_transport_failure() {
        let transport = ScriptedTransport::new();
        transport.push(URL, Reply::Unreachable);

        let result = client(&transport).check_match(&plate(), Utc::now()).await;

        assert!(!result.matched);
        assert!(result.status.is_none());
        assert!(result.failure.is_some());
    }
}
