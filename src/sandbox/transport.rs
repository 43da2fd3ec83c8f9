/*!
 * Fetch Transport
 * Outbound HTTP seam for the injected fetch capability
 */

use super::types::{RuntimeError, RuntimeResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Header stamped on every request an app makes
pub const PROCESS_ID_HEADER: &str = "x-kernel-process-id";

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking request executor
///
/// Calls arrive from inside a script evaluation, which is synchronous.
pub trait Transport: Send + Sync {
    fn send(&self, request: FetchRequest) -> RuntimeResult<FetchResponse>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    user_agent: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("desk-kernel/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn execute(
        timeout: Duration,
        user_agent: String,
        request: FetchRequest,
    ) -> RuntimeResult<FetchResponse> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| RuntimeError::Transport(format!("bad method: {}", e)))?;
        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| {
            warn!(url = %request.url, error = %e, "Fetch failed");
            RuntimeError::Transport(format!("network request failed: {}", e))
        })?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .map_err(|e| RuntimeError::Transport(format!("failed to read body: {}", e)))?;
        info!(url = %request.url, status, bytes = body.len(), "Fetched");
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: FetchRequest) -> RuntimeResult<FetchResponse> {
        // reqwest::blocking owns a runtime and refuses to run on a tokio worker
        let timeout = self.timeout;
        let user_agent = self.user_agent.clone();
        std::thread::spawn(move || Self::execute(timeout, user_agent, request))
            .join()
            .map_err(|_| RuntimeError::Transport("fetch thread panicked".into()))?
    }
}

/// Transport that records requests and answers with a canned response
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<FetchRequest>>,
    response: Mutex<Option<FetchResponse>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, status: u16, body: impl Into<String>) -> Self {
        *self.response.lock() = Some(FetchResponse {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        });
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: FetchRequest) -> RuntimeResult<FetchResponse> {
        self.requests.lock().push(request);
        Ok(self.response.lock().clone().unwrap_or(FetchResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }))
    }
}
