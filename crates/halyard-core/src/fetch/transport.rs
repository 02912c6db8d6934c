use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use halyard_protocol::HAL_JSON;
use http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;

use crate::config::HttpConfig;
use crate::error::ClientFetchError;

/// A raw HTTP response as seen by the loader.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// A HAL JSON response, optionally with `Cache-Control: max-age`.
    pub fn hal(status: u16, body: &serde_json::Value, max_age: Option<u64>) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(HAL_JSON));
        if let Some(secs) = max_age {
            if let Ok(value) = HeaderValue::from_str(&format!("max-age={secs}")) {
                response.headers.insert(CACHE_CONTROL, value);
            }
        }
        response
    }
}

/// Executes HTTP GET requests. Timeouts and connection errors surface as a
/// [`ClientFetchError`] without status.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, uri: &str) -> Result<TransportResponse, ClientFetchError>;
}

fn user_agent() -> String {
    format!("halyard/{}", env!("CARGO_PKG_VERSION"))
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client builder with harmonized defaults taken from `config`.
    pub fn builder(config: &HttpConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(config.user_agent.clone().unwrap_or_else(user_agent))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs.max(1)))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_secs.max(1)))
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Self::builder(config).build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, uri: &str) -> Result<TransportResponse, ClientFetchError> {
        let response = self
            .client
            .get(uri)
            .header(ACCEPT, HAL_JSON)
            .send()
            .await
            .map_err(|err| describe(uri, &err))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| describe(uri, &err))?;
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn describe(uri: &str, err: &reqwest::Error) -> ClientFetchError {
    let message = if err.is_timeout() {
        "upstream request timed out".to_string()
    } else if err.is_connect() {
        format!("failed to connect to upstream: {err}")
    } else {
        format!("upstream request failed: {err}")
    };
    ClientFetchError::network(uri, message)
}

/// In-memory transport answering from a script, for tests and offline demos.
///
/// Each URI maps to a queue of outcomes; the last outcome repeats once the
/// queue is drained. Unknown URIs fail like an unreachable host.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    routes: HashMap<String, Vec<Result<TransportResponse, ClientFetchError>>>,
    calls: Vec<String>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, uri: impl Into<String>, response: TransportResponse) -> &Self {
        self.inner
            .lock()
            .routes
            .entry(uri.into())
            .or_default()
            .push(Ok(response));
        self
    }

    pub fn respond_hal(
        &self,
        uri: impl Into<String>,
        body: serde_json::Value,
        max_age: Option<u64>,
    ) -> &Self {
        self.respond(uri, TransportResponse::hal(200, &body, max_age))
    }

    pub fn fail(&self, uri: impl Into<String>, message: impl Into<String>) -> &Self {
        let uri = uri.into();
        let err = ClientFetchError::network(uri.clone(), message);
        self.inner.lock().routes.entry(uri).or_default().push(Err(err));
        self
    }

    /// Delays every answer, to widen race windows in concurrency tests.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, uri: &str) -> usize {
        self.inner.lock().calls.iter().filter(|c| *c == uri).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, uri: &str) -> Result<TransportResponse, ClientFetchError> {
        let (outcome, delay) = {
            let mut state = self.inner.lock();
            state.calls.push(uri.to_string());
            let delay = state.delay;
            let outcome = match state.routes.get_mut(uri) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => match queue.first() {
                    Some(outcome) => outcome.clone(),
                    None => Err(ClientFetchError::network(uri, "no scripted response")),
                },
                None => Err(ClientFetchError::network(uri, "no scripted response")),
            };
            (outcome, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
