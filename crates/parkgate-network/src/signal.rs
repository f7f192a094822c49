//! Arrival signal polling.
//!
//! A remote key-value store holds the "vehicle arrived" flag. The worker
//! polls it and starts one cycle per arrival. Signals are edge-triggered: a
//! value held armed across many polls fires once.

#![allow(async_fn_in_trait)]

use crate::error::{NetworkError, Result};
use crate::transport::{ServiceRequest, ServiceTransport};
use chrono::{DateTime, SecondsFormat, Utc};
use parkgate_core::constants::{
    DEFAULT_MOCK_SIGNAL, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TRIGGER_PATH,
};
use parkgate_core::{CycleId, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Key-value store holding the arrival signal.
pub trait SignalStore: Send + Sync {
    /// Read the value at `path`. A missing key reads as `null`.
    async fn read(&self, path: &str) -> Result<Value>;

    /// Replace the value at `path`.
    async fn write(&self, path: &str, value: &Value) -> Result<()>;
}

/// Firebase Realtime Database over its REST interface.
///
/// `GET {base}/{path}.json[?auth=token]` reads, `PUT` writes.
#[derive(Debug, Clone)]
pub struct FirebaseSignalStore<T> {
    transport: T,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl<T: ServiceTransport> FirebaseSignalStore<T> {
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            auth_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// REST URL for `path`.
    pub fn url(&self, path: &str) -> String {
        let mut url = format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        );
        if let Some(token) = &self.auth_token {
            url.push_str("?auth=");
            url.push_str(token);
        }
        url
    }
}

impl<T: ServiceTransport> SignalStore for FirebaseSignalStore<T> {
    async fn read(&self, path: &str) -> Result<Value> {
        let response = self
            .transport
            .submit(ServiceRequest::get(self.url(path), self.timeout))
            .await?;

        if !response.is_success() {
            return Err(NetworkError::status(response.status, &response.body));
        }
        response.json()
    }

    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        let response = self
            .transport
            .submit(ServiceRequest::put_json(self.url(path), self.timeout, value.clone()))
            .await?;

        if !response.is_success() {
            return Err(NetworkError::status(response.status, &response.body));
        }
        Ok(())
    }
}

/// When a trigger value counts as an arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmCondition {
    /// The value equals this one.
    Equals(Value),
    /// Any non-null value different from the last consumed one and from
    /// the configured reset value.
    Changed,
}

impl Default for ArmCondition {
    fn default() -> Self {
        Self::Equals(Value::Bool(true))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalConfig {
    pub trigger_path: String,
    /// Where to record consumed signals.
    pub ack_path: Option<String>,
    /// Written back to the trigger path after a signal is consumed.
    pub reset_value: Option<Value>,
    pub arm: ArmCondition,
    pub poll_interval: Duration,
    /// Skip the store entirely and fire immediately with this value.
    pub bypass: Option<Value>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trigger_path: DEFAULT_TRIGGER_PATH.to_string(),
            ack_path: None,
            reset_value: None,
            arm: ArmCondition::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            bypass: None,
        }
    }
}

impl SignalConfig {
    pub fn trigger_path(mut self, path: impl Into<String>) -> Self {
        self.trigger_path = path.into();
        self
    }

    pub fn ack_path(mut self, path: Option<String>) -> Self {
        self.ack_path = path;
        self
    }

    pub fn reset_value(mut self, value: Option<Value>) -> Self {
        self.reset_value = value;
        self
    }

    pub fn arm(mut self, arm: ArmCondition) -> Self {
        self.arm = arm;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn bypass(mut self, value: Option<Value>) -> Self {
        self.bypass = value;
        self
    }

    /// Bypass with the default mock value.
    pub fn bypass_default(self) -> Self {
        self.bypass(Some(Value::String(DEFAULT_MOCK_SIGNAL.to_string())))
    }
}

/// A consumed arrival signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub value: Value,
    pub observed_at: DateTime<Utc>,
    /// Store reads made while waiting; zero when bypassed.
    pub polls: u32,
    pub waited_ms: u64,
    pub bypassed: bool,
}

/// Polls the store until an arrival is signalled.
#[derive(Debug)]
pub struct SignalWaiter<S> {
    store: S,
    config: SignalConfig,
    /// Set after an `Equals` signal fires, cleared by an unarmed read.
    latched: bool,
    last_consumed: Option<Value>,
}

impl<S: SignalStore> SignalWaiter<S> {
    pub fn new(store: S, config: SignalConfig) -> Self {
        Self {
            store,
            config,
            latched: false,
            last_consumed: None,
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Wait for the next arrival.
    ///
    /// `None` waits indefinitely. Read errors are logged and polling
    /// continues until the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SignalTimeout` if no signal fires within
    /// `timeout`.
    pub async fn wait_for_signal(
        &mut self,
        cycle: CycleId,
        timeout: Option<Duration>,
    ) -> std::result::Result<SignalEvent, PipelineError> {
        if let Some(value) = &self.config.bypass {
            info!(cycle_id = %cycle, value = %value, "Signal bypassed");
            return Ok(SignalEvent {
                value: value.clone(),
                observed_at: Utc::now(),
                polls: 0,
                waited_ms: 0,
                bypassed: true,
            });
        }

        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut polls = 0u32;

        debug!(
            cycle_id = %cycle,
            path = %self.config.trigger_path,
            ?timeout,
            "Waiting for signal"
        );

        loop {
            polls = polls.saturating_add(1);

            // A slow store must not stretch the wait past its budget.
            let read = self.store.read(&self.config.trigger_path);
            let result = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, read).await.ok(),
                None => Some(read.await),
            };

            match result {
                Some(Ok(value)) => {
                    trace!(path = %self.config.trigger_path, value = %value, "Polled");
                    if self.observe(&value) {
                        let waited_ms = millis(started.elapsed());
                        info!(
                            cycle_id = %cycle,
                            value = %value,
                            polls,
                            waited_ms,
                            "Signal received"
                        );
                        self.consume(cycle, &value).await;
                        return Ok(SignalEvent {
                            value,
                            observed_at: Utc::now(),
                            polls,
                            waited_ms,
                            bypassed: false,
                        });
                    }
                }
                Some(Err(e)) => {
                    warn!(path = %self.config.trigger_path, error = %e, "Signal read failed");
                }
                None => debug!(path = %self.config.trigger_path, "Signal read cut off by timeout"),
            }

            let mut pause = self.config.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    let waited_ms = millis(started.elapsed());
                    warn!(cycle_id = %cycle, waited_ms, polls, "No signal before timeout");
                    return Err(PipelineError::SignalTimeout { waited_ms });
                }
                pause = pause.min(deadline - now);
            }
            tokio::time::sleep(pause).await;
        }
    }

    /// Apply the edge-trigger rules to one read. Returns `true` if it fires.
    fn observe(&mut self, value: &Value) -> bool {
        let fire = match &self.config.arm {
            ArmCondition::Equals(target) => {
                if value == target {
                    !std::mem::replace(&mut self.latched, true)
                } else {
                    self.latched = false;
                    false
                }
            }
            // The reset value is our own write, never an arrival.
            ArmCondition::Changed => {
                !value.is_null()
                    && self.config.reset_value.as_ref() != Some(value)
                    && self.last_consumed.as_ref() != Some(value)
            }
        };

        if fire {
            self.last_consumed = Some(value.clone());
        }
        fire
    }

    async fn consume(&self, cycle: CycleId, value: &Value) {
        if let Some(ack_path) = &self.config.ack_path {
            let ack = json!({
                "value": value,
                "consumed_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "cycle_id": cycle.as_u64(),
            });
            if let Err(e) = self.store.write(ack_path, &ack).await {
                warn!(path = %ack_path, error = %e, "Ack write failed");
            }
        }

        if let Some(reset) = &self.config.reset_value {
            if let Err(e) = self.store.write(&self.config.trigger_path, reset).await {
                warn!(path = %self.config.trigger_path, error = %e, "Signal reset failed");
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemorySignalStore, Reply, ScriptedTransport};
    use crate::transport::Method;

    const PATH: &str = "parking/car_detected";

    fn waiter(store: &MemorySignalStore, config: SignalConfig) -> SignalWaiter<MemorySignalStore> {
        SignalWaiter::new(store.clone(), config.poll_interval(Duration::from_millis(100)))
    }

    #[test]
    fn test_firebase_url() {
        let store =
            FirebaseSignalStore::new(ScriptedTransport::new(), "https://demo.firebaseio.com/");
        assert_eq!(
            store.url("/parking/car_detected"),
            "https://demo.firebaseio.com/parking/car_detected.json"
        );

        let store = store.with_auth_token("secret");
        assert_eq!(store.url("a/b"), "https://demo.firebaseio.com/a/b.json?auth=secret");
    }

    #[tokio::test]
    async fn test_firebase_read_and_write() {
        let transport = ScriptedTransport::new();
        let store = FirebaseSignalStore::new(transport.clone(), "https://demo.firebaseio.com");
        let url = store.url(PATH);
        transport.push(&url, Reply::json(200, json!(true)));

        assert_eq!(store.read(PATH).await.unwrap(), json!(true));
        store.write(PATH, &json!(false)).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].url, url);
    }

    #[tokio::test]
    async fn test_firebase_read_error_status() {
        let transport = ScriptedTransport::new();
        let store = FirebaseSignalStore::new(transport.clone(), "https://demo.firebaseio.com");
        transport.push(&store.url(PATH), Reply::json(401, json!({"error": "Permission denied"})));

        let result = store.read(PATH).await;
        assert!(matches!(result, Err(NetworkError::Status { status: 401, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_when_value_becomes_armed() {
        let store = MemorySignalStore::new();
        store.script(PATH, [json!(false), json!(false), json!(true)]);
        let mut waiter = waiter(&store, SignalConfig::default());

        let event = waiter.wait_for_signal(CycleId::FIRST, None).await.unwrap();

        assert_eq!(event.value, json!(true));
        assert_eq!(event.polls, 3);
        assert!(!event.bypassed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_armed_value_fires_once() {
        let store = MemorySignalStore::new();
        store.set(PATH, json!(true));
        let mut waiter = waiter(&store, SignalConfig::default());

        assert!(waiter.wait_for_signal(CycleId::new(1), None).await.is_ok());

        let second = waiter
            .wait_for_signal(CycleId::new(2), Some(Duration::from_secs(1)))
            .await;
        assert!(matches!(second, Err(PipelineError::SignalTimeout { .. })));
        assert!(store.read_count() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latch_clears_on_unarmed_value() {
        let store = MemorySignalStore::new();
        store.script(PATH, [json!(true), json!(true), json!(false), json!(true)]);
        let mut waiter = waiter(&store, SignalConfig::default());

        let first = waiter.wait_for_signal(CycleId::new(1), None).await.unwrap();
        let second = waiter.wait_for_signal(CycleId::new(2), None).await.unwrap();

        assert_eq!(first.polls, 1);
        assert_eq!(second.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_mode() {
        let store = MemorySignalStore::new();
        store.script(PATH, [json!(null), json!("car-1"), json!("car-1"), json!("car-2")]);
        let config = SignalConfig::default().arm(ArmCondition::Changed);
        let mut waiter = waiter(&store, config);

        let first = waiter.wait_for_signal(CycleId::new(1), None).await.unwrap();
        let second = waiter.wait_for_signal(CycleId::new(2), None).await.unwrap();

        assert_eq!(first.value, json!("car-1"));
        assert_eq!(second.value, json!("car-2"));
        assert_eq!(second.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_mode_ignores_own_reset() {
        let store = MemorySignalStore::new();
        store.set(PATH, json!("car-1"));
        let config = SignalConfig::default()
            .arm(ArmCondition::Changed)
            .reset_value(Some(json!(false)));
        let mut waiter = waiter(&store, config);

        let first = waiter.wait_for_signal(CycleId::new(1), None).await.unwrap();
        assert_eq!(first.value, json!("car-1"));
        assert_eq!(store.get(PATH), Some(json!(false)));

        let second = waiter
            .wait_for_signal(CycleId::new(2), Some(Duration::from_secs(1)))
            .await;
        assert!(matches!(second, Err(PipelineError::SignalTimeout { .. })));

        store.set(PATH, json!("car-2"));
        let third = waiter.wait_for_signal(CycleId::new(3), None).await.unwrap();
        assert_eq!(third.value, json!("car-2"));
    }

    /// Store whose reads never answer in time.
    struct StalledStore;

    impl SignalStore for StalledStore {
        async fn read(&self, _path: &str) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!(true))
        }

        async fn write(&self, _path: &str, _value: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_read_does_not_overrun_timeout() {
        let mut waiter = SignalWaiter::new(StalledStore, SignalConfig::default());

        let result = waiter
            .wait_for_signal(CycleId::FIRST, Some(Duration::from_secs(1)))
            .await;

        let Err(PipelineError::SignalTimeout { waited_ms }) = result else {
            panic!("expected timeout");
        };
        assert!((1_000..2_000).contains(&waited_ms), "waited {waited_ms}ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_and_reset_written() {
        let store = MemorySignalStore::new();
        store.set(PATH, json!(true));
        let config = SignalConfig::default()
            .ack_path(Some("parking/ack".to_string()))
            .reset_value(Some(json!(false)));
        let mut waiter = waiter(&store, config);

        waiter.wait_for_signal(CycleId::new(4), None).await.unwrap();

        let ack = store.get("parking/ack").unwrap();
        assert_eq!(ack["value"], json!(true));
        assert_eq!(ack["cycle_id"], json!(4));
        assert!(ack["consumed_at"].is_string());
        assert_eq!(store.get(PATH), Some(json!(false)));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_keep_polling() {
        let store = MemorySignalStore::new();
        store.fail_reads(2);
        store.set(PATH, json!(true));
        let mut waiter = waiter(&store, SignalConfig::default());

        let event = waiter
            .wait_for_signal(CycleId::FIRST, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(event.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_waited_time() {
        let store = MemorySignalStore::new();
        store.set(PATH, json!(false));
        let mut waiter = waiter(&store, SignalConfig::default());

        let result = waiter
            .wait_for_signal(CycleId::FIRST, Some(Duration::from_millis(450)))
            .await;

        let Err(PipelineError::SignalTimeout { waited_ms }) = result else {
            panic!("expected timeout");
        };
        assert!(waited_ms >= 450);
    }

    #[tokio::test]
    async fn test_bypass_makes_no_store_calls() {
        let store = MemorySignalStore::new();
        let config = SignalConfig::default()
            .bypass_default()
            .ack_path(Some("parking/ack".to_string()));
        let mut waiter = waiter(&store, config);

        let event = waiter.wait_for_signal(CycleId::FIRST, None).await.unwrap();

        assert!(event.bypassed);
        assert_eq!(event.value, json!("manual"));
        assert_eq!(store.read_count(), 0);
        assert_eq!(store.write_count(), 0);
    }
}
