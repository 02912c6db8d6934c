use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HalDocument;

/// A HAL document as received over HTTP, together with the response metadata
/// the cache and the metrics collector need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalResponse {
    pub uri: String,
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Seconds the response may be reused; `None` when the upstream did not say.
    #[serde(default)]
    pub max_age: Option<u64>,
    pub retrieved_at: DateTime<Utc>,
    #[serde(default)]
    pub body: Option<HalDocument>,
}

impl HalResponse {
    pub fn new(uri: impl Into<String>, status: u16, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            status,
            content_type: None,
            max_age: None,
            retrieved_at,
            body: None,
        }
    }

    pub fn with_body(mut self, body: HalDocument) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_max_age(mut self, max_age: Option<u64>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Title of the fetched resource, taken from its self link.
    pub fn title(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(HalDocument::self_link)
            .and_then(|link| link.title.as_deref())
    }
}
