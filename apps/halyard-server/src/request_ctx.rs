use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use halyard_core::RequestContext;
use tokio::task_local;
use uuid::Uuid;

pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_CORR: &str = "x-correlation-id";
const MAX_ID_LEN: usize = 128;

task_local! {
    static REQ_CORR: Correlation;
}

/// Identifiers attached to one inbound request.
#[derive(Clone, Debug)]
pub struct Correlation {
    request_id: String,
    corr_id: String,
}

impl Correlation {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }
}

/// Assigns request and correlation ids, echoing both on the response.
pub async fn correlation_mw(mut req: Request<Body>, next: Next) -> Response {
    let request_id = header_id(&req, HEADER_REQUEST_ID).unwrap_or_else(|| Uuid::new_v4().to_string());
    let corr_id = header_id(&req, HEADER_CORR).unwrap_or_else(|| request_id.clone());
    let correlation = Correlation {
        request_id,
        corr_id,
    };
    req.extensions_mut().insert(correlation.clone());

    REQ_CORR
        .scope(correlation.clone(), async move {
            let mut res = next.run(req).await;
            for (name, value) in [
                (HEADER_REQUEST_ID, correlation.request_id()),
                (HEADER_CORR, correlation.corr_id()),
            ] {
                let name = HeaderName::from_static(name);
                if res.headers().get(&name).is_none() {
                    if let Ok(value) = HeaderValue::from_str(value) {
                        res.headers_mut().insert(name, value);
                    }
                }
            }
            res
        })
        .await
}

pub fn current() -> Option<Correlation> {
    REQ_CORR.try_with(|ctx| ctx.clone()).ok()
}

/// Attaches the current correlation id and the `?diagnostics` flag to `ctx`.
pub fn enrich(ctx: RequestContext, query: Option<&str>) -> RequestContext {
    let ctx = match current() {
        Some(corr) => ctx.with_correlation_id(corr.corr_id()),
        None => ctx,
    };
    if wants_diagnostics(query) {
        ctx.with_embed_diagnostics(true)
    } else {
        ctx
    }
}

fn wants_diagnostics(query: Option<&str>) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "1"));
            (key == "diagnostics").then_some(value)
        })
        .any(|value| !matches!(value, "0" | "false" | "no"))
}

fn header_id<B>(req: &Request<B>, name: &'static str) -> Option<String> {
    req.headers()
        .get(HeaderName::from_static(name))
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id)
}

fn normalize_id(raw: &str) -> Option<String> {
    let out: String = raw
        .trim()
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_ID_LEN)
        .collect();
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn ids_are_trimmed_and_bounded() {
        assert_eq!(normalize_id("  abc  "), Some("abc".into()));
        assert!(normalize_id(" \u{0007} ").is_none());
        assert_eq!(normalize_id("a\u{0007}b\u{007f}c"), Some("abc".into()));
        assert_eq!(normalize_id(&"x".repeat(MAX_ID_LEN + 9)).unwrap().len(), MAX_ID_LEN);
    }

    #[test]
    fn diagnostics_flag() {
        assert!(wants_diagnostics(Some("diagnostics")));
        assert!(wants_diagnostics(Some("a=1&diagnostics=true")));
        assert!(!wants_diagnostics(Some("diagnostics=0")));
        assert!(!wants_diagnostics(Some("diag")));
        assert!(!wants_diagnostics(None));
    }

    #[tokio::test]
    async fn correlation_reaches_handlers_and_responses() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    let ctx = enrich(RequestContext::new(), None);
                    ctx.correlation_id().unwrap_or_default().to_string()
                }),
            )
            .layer(axum::middleware::from_fn(correlation_mw));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(HEADER_REQUEST_ID, "req-1")
                    .header(HEADER_CORR, "corr-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[HEADER_CORR], "corr-1");
        assert_eq!(response.headers()[HEADER_REQUEST_ID], "req-1");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"corr-1");
    }

    #[tokio::test]
    async fn missing_ids_are_generated() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(correlation_mw));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let request_id = response.headers()[HEADER_REQUEST_ID].to_str().unwrap();
        assert!(Uuid::parse_str(request_id).is_ok());
        assert_eq!(response.headers()[HEADER_CORR], request_id);
    }
}
