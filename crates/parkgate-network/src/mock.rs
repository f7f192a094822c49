//! Test doubles for the service transport and the signal store.

use crate::error::{NetworkError, Result};
use crate::signal::SignalStore;
use crate::transport::{ServiceRequest, ServiceResponse, ServiceTransport};
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A canned answer for [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Response { status: u16, body: Bytes },
    /// Fail as if the request deadline passed.
    Timeout,
    /// Fail as if the connection was refused.
    Unreachable,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Response {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Response {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }
}

#[derive(Debug, Default)]
struct TransportState {
    replies: HashMap<String, VecDeque<Reply>>,
    requests: Vec<ServiceRequest>,
}

/// Transport answering from per-URL reply queues and logging every request.
///
/// Replies for a URL are served in order; the last one repeats. A URL with
/// no replies answers `404`.
///
/// # Examples
///
/// ```
/// use parkgate_network::mock::{Reply, ScriptedTransport};
/// use parkgate_network::transport::{ServiceRequest, ServiceTransport};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = ScriptedTransport::new();
///     transport.push("http://svc/health", Reply::text(200, "ok"));
///
///     let request = ServiceRequest::get("http://svc/health", Duration::from_secs(1));
///     let response = transport.submit(request).await.unwrap();
///     assert_eq!(response.status, 200);
///     assert_eq!(transport.calls_to("http://svc/"), 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for requests to `url`.
    pub fn push(&self, url: impl Into<String>, reply: Reply) {
        lock(&self.state)
            .replies
            .entry(url.into())
            .or_default()
            .push_back(reply);
    }

    /// Every request submitted so far, in order.
    pub fn requests(&self) -> Vec<ServiceRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .count()
    }
}

impl ServiceTransport for ScriptedTransport {
    async fn submit(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let mut state = lock(&self.state);
        let timeout = request.timeout;

        let reply = match state.replies.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        state.requests.push(request);

        match reply {
            Some(Reply::Response { status, body }) => Ok(ServiceResponse {
                status,
                body,
                latency: Duration::ZERO,
            }),
            Some(Reply::Timeout) => Err(NetworkError::timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
            Some(Reply::Unreachable) => Err(NetworkError::transport("connection refused")),
            None => Ok(ServiceResponse {
                status: 404,
                body: Bytes::from_static(br#"{"error":"no scripted reply"}"#),
                latency: Duration::ZERO,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    values: HashMap<String, Value>,
    scripts: HashMap<String, VecDeque<Value>>,
    failing_reads: usize,
    reads: usize,
    writes: Vec<(String, Value)>,
}

/// In-memory signal store with call counters.
///
/// Reads return scripted values first, then the stored value (`null` when
/// unset). A scripted value also becomes the stored value.
#[derive(Debug, Clone, Default)]
pub struct MemorySignalStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<String>, value: Value) {
        lock(&self.state).values.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        lock(&self.state).values.get(path).cloned()
    }

    /// Queue values returned by the next reads of `path`.
    pub fn script(&self, path: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        lock(&self.state)
            .scripts
            .entry(path.into())
            .or_default()
            .extend(values);
    }

    /// Make the next `count` reads fail.
    pub fn fail_reads(&self, count: usize) {
        lock(&self.state).failing_reads = count;
    }

    pub fn read_count(&self) -> usize {
        lock(&self.state).reads
    }

    pub fn write_count(&self) -> usize {
        lock(&self.state).writes.len()
    }

    /// Every write, in order.
    pub fn writes(&self) -> Vec<(String, Value)> {
        lock(&self.state).writes.clone()
    }
}

impl SignalStore for MemorySignalStore {
    async fn read(&self, path: &str) -> Result<Value> {
        let mut state = lock(&self.state);
        state.reads += 1;

        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(NetworkError::transport("scripted read failure"));
        }

        if let Some(value) = state.scripts.get_mut(path).and_then(VecDeque::pop_front) {
            state.values.insert(path.to_string(), value.clone());
            return Ok(value);
        }

        Ok(state.values.get(path).cloned().unwrap_or(Value::Null))
    }

    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        let mut state = lock(&self.state);
        state.writes.push((path.to_string(), value.clone()));
        state.values.insert(path.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_reply_repeats() {
        let transport = ScriptedTransport::new();
        transport.push("http://a", Reply::text(500, "boom"));
        transport.push("http://a", Reply::text(200, "ok"));

        for expected in [500, 200, 200] {
            let response = transport
                .submit(ServiceRequest::get("http://a", Duration::from_secs(1)))
                .await
                .unwrap();
            assert_eq!(response.status, expected);
        }
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_url_is_404() {
        let transport = ScriptedTransport::new();
        let response = transport
            .submit(ServiceRequest::get("http://nowhere", Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_memory_store_script_then_value() {
        let store = MemorySignalStore::new();
        store.script("k", [json!(1), json!(2)]);

        assert_eq!(store.read("k").await.unwrap(), json!(1));
        assert_eq!(store.read("k").await.unwrap(), json!(2));
        assert_eq!(store.read("k").await.unwrap(), json!(2));
        assert_eq!(store.read("other").await.unwrap(), Value::Null);
        assert_eq!(store.read_count(), 4);
    }
}
