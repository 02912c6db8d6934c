use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;

use crate::request_ctx;

#[derive(Clone, Debug)]
struct Cfg {
    enabled: bool,
    sample_n: u64,
}

static CFG: Lazy<Cfg> = Lazy::new(|| Cfg {
    enabled: std::env::var("HALYARD_ACCESS_LOG").ok().as_deref() != Some("0"),
    sample_n: std::env::var("HALYARD_ACCESS_SAMPLE_N")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
        .max(1),
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// One `http.access` event per sampled request.
pub async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    if !CFG.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let res = next.run(req).await;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    if CFG.sample_n > 1 && n % CFG.sample_n != 0 {
        return res;
    }
    let cache = res
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let corr = request_ctx::current();
    tracing::info!(
        target: halyard_otel::ACCESS_TARGET,
        method = %method,
        path = %path,
        status = res.status().as_u16(),
        dur_ms = started.elapsed().as_millis() as u64,
        cache_control = %cache,
        corr_id = corr.as_ref().map(|c| c.corr_id()).unwrap_or("-"),
        "request"
    );
    res
}
