use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use halyard_protocol::{HalDocument, Link, ABOUT_REL, DIAGNOSTICS_REL, ERRORS_REL};
use tracing::Level;

use crate::context::RequestContext;
use crate::error::HalyardError;

/// Maps errors to HTTP status codes and log levels.
///
/// Strategies form an ordered chain; the first one returning `Some` wins.
pub trait StatusStrategy: Send + Sync {
    fn status_code(&self, err: &HalyardError) -> Option<u16>;

    fn log_level(&self, _err: &HalyardError, _status: u16) -> Option<Level> {
        None
    }
}

/// Built-in mapping, consulted after every custom strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusStrategy;

impl StatusStrategy for DefaultStatusStrategy {
    fn status_code(&self, err: &HalyardError) -> Option<u16> {
        if let Some(logic) = err.as_server_logic() {
            return Some(logic.status);
        }
        if err.as_contract().is_some() {
            return Some(500);
        }
        if let Some(fetch) = err.as_client_fetch() {
            return Some(match fetch.status {
                Some(status @ 400..=599) => status,
                _ => 502,
            });
        }
        None
    }

    fn log_level(&self, _err: &HalyardError, status: u16) -> Option<Level> {
        Some(if status >= 500 { Level::ERROR } else { Level::INFO })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub document: HalDocument,
}

/// Converts any [`HalyardError`] into an error document. Never fails.
#[derive(Clone)]
pub struct ErrorRenderer {
    strategies: Vec<Arc<dyn StatusStrategy>>,
}

impl Default for ErrorRenderer {
    fn default() -> Self {
        Self {
            strategies: vec![Arc::new(DefaultStatusStrategy)],
        }
    }
}

impl ErrorRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strategy consulted before the built-in one, after those added
    /// earlier.
    pub fn with_strategy(mut self, strategy: Arc<dyn StatusStrategy>) -> Self {
        let at = self.strategies.len().saturating_sub(1);
        self.strategies.insert(at, strategy);
        self
    }

    pub fn status_for(&self, err: &HalyardError) -> u16 {
        self.strategies
            .iter()
            .find_map(|strategy| {
                match catch_unwind(AssertUnwindSafe(|| strategy.status_code(err))) {
                    Ok(Some(status)) if (100..=599).contains(&status) => Some(status),
                    Ok(_) => None,
                    Err(_) => {
                        tracing::warn!("status strategy panicked; ignoring it");
                        None
                    }
                }
            })
            .unwrap_or(500)
    }

    fn level_for(&self, err: &HalyardError, status: u16) -> Level {
        self.strategies
            .iter()
            .find_map(|strategy| {
                catch_unwind(AssertUnwindSafe(|| strategy.log_level(err, status)))
                    .ok()
                    .flatten()
            })
            .unwrap_or(Level::ERROR)
    }

    /// Error messages come from user `Display` impls, so a panic while
    /// describing `err` falls back to a document without them.
    pub fn render(&self, ctx: &RequestContext, err: &HalyardError) -> ErrorResponse {
        let status = self.status_for(err);
        let level = self.level_for(err, status);
        if catch_unwind(AssertUnwindSafe(|| log(level, ctx, err, status))).is_err() {
            tracing::error!(status, "error description panicked while logging");
        }
        let document = catch_unwind(AssertUnwindSafe(|| describe(ctx, err, status)))
            .unwrap_or_else(|_| {
                let reason = canonical_reason(status).unwrap_or("error");
                let mut document = heading(ctx, reason.to_string(), status);
                document.set_embedded(DIAGNOSTICS_REL, ctx.metrics().diagnostics());
                document
            });
        ErrorResponse { status, document }
    }
}

fn canonical_reason(status: u16) -> Option<&'static str> {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
}

fn heading(ctx: &RequestContext, message: String, status: u16) -> HalDocument {
    let mut document = HalDocument::new()
        .with_field("message", message)
        .with_field("status", status);
    if let Some(reason) = canonical_reason(status) {
        document.state.insert("title".into(), reason.into());
    }
    if let Some(uri) = ctx.request_uri() {
        document.set_link(ABOUT_REL, Link::new(uri));
    }
    document
}

fn describe(ctx: &RequestContext, err: &HalyardError, status: u16) -> HalDocument {
    let mut document = heading(ctx, err.to_string(), status);
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        document.push_embedded(
            ERRORS_REL,
            HalDocument::new().with_field("message", inner.to_string()),
        );
        cause = inner.source();
    }
    if let Some(fetch) = err.as_client_fetch() {
        if let Some(upstream) = fetch.error_document() {
            let mut upstream = upstream.clone();
            if upstream.links(ABOUT_REL).is_empty() {
                upstream.set_link(ABOUT_REL, Link::new(fetch.uri.clone()));
            }
            document.push_embedded(ERRORS_REL, upstream);
        }
    }
    document.set_embedded(DIAGNOSTICS_REL, ctx.metrics().diagnostics());
    document
}

fn log(level: Level, ctx: &RequestContext, err: &HalyardError, status: u16) {
    let uri = ctx.request_uri().unwrap_or("-");
    let corr = ctx.correlation_id().unwrap_or("-");
    match level {
        Level::ERROR => tracing::error!(%uri, corr_id = %corr, status, error = %err, "request failed"),
        Level::WARN => tracing::warn!(%uri, corr_id = %corr, status, error = %err, "request failed"),
        Level::INFO => tracing::info!(%uri, corr_id = %corr, status, error = %err, "request failed"),
        Level::DEBUG => tracing::debug!(%uri, corr_id = %corr, status, error = %err, "request failed"),
        _ => tracing::trace!(%uri, corr_id = %corr, status, error = %err, "request failed"),
    }
}
