use std::sync::Arc;

use async_trait::async_trait;
use halyard_protocol::{HalDocument, HalResponse};
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::HeaderMap;

use super::cache_control::parse_max_age;
use super::clock::{Clock, SystemClock};
use super::transport::{HttpTransport, TransportResponse};
use crate::error::ClientFetchError;

/// Loads HAL responses by URI.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn get(&self, uri: &str) -> Result<HalResponse, ClientFetchError>;
}

/// Turns raw transport responses into [`HalResponse`]s.
pub struct TransportLoader {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl TransportLoader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_clock(transport, Arc::new(SystemClock))
    }

    pub fn with_clock(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }
}

#[async_trait]
impl ResourceLoader for TransportLoader {
    async fn get(&self, uri: &str) -> Result<HalResponse, ClientFetchError> {
        let raw = self.transport.get(uri).await?;
        convert(uri, raw, self.clock.now())
    }
}

fn convert(
    uri: &str,
    raw: TransportResponse,
    retrieved_at: chrono::DateTime<chrono::Utc>,
) -> Result<HalResponse, ClientFetchError> {
    let mut response = HalResponse::new(uri, raw.status, retrieved_at)
        .with_max_age(max_age(&raw.headers));
    response.content_type = raw
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let success = response.is_success();
    if !raw.body.iter().all(u8::is_ascii_whitespace) {
        match HalDocument::from_slice(&raw.body) {
            Ok(doc) => response.body = Some(doc),
            Err(err) if success => {
                return Err(ClientFetchError::invalid_data(
                    uri,
                    format!("response is not a HAL document: {err}"),
                ))
            }
            Err(err) => {
                tracing::debug!(%uri, status = raw.status, %err, "error body is not JSON");
            }
        }
    }

    if !success {
        let message = format!("upstream responded with status {}", raw.status);
        return Err(ClientFetchError::from_response(response, message));
    }
    Ok(response)
}

/// Max-age across every `Cache-Control` header line.
fn max_age(headers: &HeaderMap) -> Option<u64> {
    let joined = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    parse_max_age(&joined)
}
