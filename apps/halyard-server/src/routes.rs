use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use halyard_core::{
    handle, HalyardError, RenderedResponse, RequestContext, ServerLogicError,
};
use tower_http::trace::TraceLayer;

use crate::access_log::access_log_mw;
use crate::catalog::{ApiRoot, Category, CategoryResource, Product, ProductResource, RootResource};
use crate::proxy;
use crate::request_ctx::{correlation_mw, enrich};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/products/{id}", get(product))
        .route("/categories/{slug}", get(category))
        .route("/proxy", get(proxy_root))
        .route("/proxy/cheapest", get(proxy_cheapest))
        .route("/proxy/{*path}", get(proxy_path))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
        .layer(axum::middleware::from_fn(access_log_mw))
        .layer(axum::middleware::from_fn(correlation_mw))
        .layer(TraceLayer::new_for_http())
}

fn request_context(state: &AppState, uri: &Uri) -> RequestContext {
    enrich(state.engine.request(uri.path()), uri.query())
}

fn into_response(rendered: RenderedResponse) -> Response {
    let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match serde_json::to_vec(&rendered.body.to_value()) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(%err, "serializing response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut res = (status, body).into_response();
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(rendered.content_type),
    );
    if let Some(value) = rendered
        .cache_control()
        .and_then(|cc| HeaderValue::from_str(&cc).ok())
    {
        headers.insert(header::CACHE_CONTROL, value);
    }
    res
}

fn parse_id(raw: &str) -> Result<u32, HalyardError> {
    raw.parse()
        .map_err(|_| ServerLogicError::bad_request(format!("'{raw}' is not a product id")).into())
}

async fn root(State(state): State<AppState>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let resource = handle(RootResource {
        store: state.store.clone(),
    });
    into_response(
        state
            .engine
            .handler()
            .respond_as::<ApiRoot>(&ctx, resource)
            .await,
    )
}

async fn product(State(state): State<AppState>, Path(id): Path<String>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let engine = &state.engine;
    let rendered = engine
        .handler()
        .respond_with(&ctx, async {
            let product = ProductResource::load(&state.store, parse_id(&id)?)?;
            engine
                .renderer()
                .render_as::<Product>(&ctx, handle(product))
                .await
        })
        .await;
    into_response(rendered)
}

async fn category(State(state): State<AppState>, Path(slug): Path<String>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let engine = &state.engine;
    let rendered = engine
        .handler()
        .respond_with(&ctx, async {
            let props = state.store.category(&slug).cloned().ok_or_else(|| {
                ServerLogicError::not_found(format!("no category named {slug}"))
            })?;
            engine
                .renderer()
                .render_as::<Category>(&ctx, handle(CategoryResource(props)))
                .await
        })
        .await;
    into_response(rendered)
}

async fn proxy_root(State(state): State<AppState>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let rendered = state
        .engine
        .handler()
        .respond_with(&ctx, proxy::mirror(&state, &ctx, ""))
        .await;
    into_response(rendered)
}

async fn proxy_path(State(state): State<AppState>, Path(path): Path<String>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let rendered = state
        .engine
        .handler()
        .respond_with(&ctx, proxy::mirror(&state, &ctx, &path))
        .await;
    into_response(rendered)
}

async fn proxy_cheapest(State(state): State<AppState>, uri: Uri) -> Response {
    let ctx = request_context(&state, &uri);
    let rendered = state
        .engine
        .handler()
        .respond_with(&ctx, proxy::cheapest(&state, &ctx))
        .await;
    into_response(rendered)
}
