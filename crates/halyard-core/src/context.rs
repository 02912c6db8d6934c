use std::sync::Arc;

use crate::metrics::RequestMetrics;

/// State scoped to one incoming request.
///
/// Cloning is cheap and every clone shares the same [`RequestMetrics`]; a
/// context must never be reused for a second request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    request_uri: Option<String>,
    correlation_id: Option<String>,
    embed_diagnostics: bool,
    metrics: Arc<RequestMetrics>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_uri(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            metrics: Arc::new(RequestMetrics::new(Some(uri.clone()))),
            request_uri: Some(uri),
            ..Self::default()
        }
    }

    pub fn with_embed_diagnostics(mut self, embed: bool) -> Self {
        self.embed_diagnostics = embed;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn embed_diagnostics(&self) -> bool {
        self.embed_diagnostics
    }

    pub fn metrics(&self) -> &Arc<RequestMetrics> {
        &self.metrics
    }

    /// Caps the max-age of the response to this request.
    pub fn limit_max_age(&self, secs: u64) {
        self.metrics.limit_max_age(secs);
    }
}
