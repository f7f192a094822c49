//! Request/response seam shared by every HTTP collaborator.
//!
//! The recognition client, the match client and the signal store describe
//! their calls as [`ServiceRequest`] values and hand them to a
//! [`ServiceTransport`]. Production uses [`HttpTransport`]; tests substitute
//! [`ScriptedTransport`](crate::mock::ScriptedTransport) fixtures.
//!
//! A transport returns `Ok` for every response it received, whatever the
//! status. Only failures to get a response at all are errors.

#![allow(async_fn_in_trait)]

use crate::error::{NetworkError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// Single-file multipart upload.
    Multipart {
        field: String,
        file_name: String,
        mime: String,
        data: Bytes,
    },
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: Method,
    pub url: String,
    pub timeout: Duration,
    pub body: RequestBody,
}

impl ServiceRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            timeout,
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, timeout: Duration, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            timeout,
            body: RequestBody::Json(body),
        }
    }

    pub fn put_json(url: impl Into<String>, timeout: Duration, body: serde_json::Value) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            timeout,
            body: RequestBody::Json(body),
        }
    }

    pub fn post_file(
        url: impl Into<String>,
        timeout: Duration,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            timeout,
            body: RequestBody::Multipart {
                field: field.into(),
                file_name: file_name.into(),
                mime: mime.into(),
                data: data.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Bytes,
    pub latency: Duration,
}

impl ServiceResponse {
    /// Returns `true` for 2xx statuses.
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidResponse` if the body is not valid JSON
    /// for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| NetworkError::invalid_response(format!("malformed body: {e}")))
    }

    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Carries service requests.
pub trait ServiceTransport: Send + Sync {
    /// Send one request and wait for its response, bounded by the request's
    /// timeout. No retries.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Timeout` if the deadline passes and
    /// `NetworkError::Transport` if no response was received.
    async fn submit(&self, request: ServiceRequest) -> Result<ServiceResponse>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Transport` if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parkgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::transport(format!("client init failed: {e}")))?;
        Ok(Self { client })
    }

    fn build(&self, request: ServiceRequest) -> Result<reqwest::RequestBuilder> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        }
        .timeout(request.timeout);

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart {
                field,
                file_name,
                mime,
                data,
            } => {
                let part = reqwest::multipart::Part::bytes(data.to_vec())
                    .file_name(file_name)
                    .mime_str(&mime)
                    .map_err(|e| NetworkError::transport(format!("invalid mime {mime}: {e}")))?;
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        Ok(builder)
    }
}

impl ServiceTransport for HttpTransport {
    async fn submit(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let method = request.method;
        let url = request.url.clone();
        let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
        trace!(%method, %url, timeout_ms, "Submitting request");

        let started = Instant::now();
        let builder = self.build(request)?;

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                warn!(%method, %url, timeout_ms, "Request timed out");
                NetworkError::timeout(timeout_ms)
            } else {
                warn!(%method, %url, error = %e, "Request failed");
                NetworkError::transport(e.to_string())
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;
        let response = ServiceResponse {
            status,
            body,
            latency: started.elapsed(),
        };

        debug!(
            %method,
            %url,
            status,
            latency_ms = response.latency_ms(),
            "Response received"
        );

        Ok(response)
    }
}
