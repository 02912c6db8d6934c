use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use halyard_protocol::{HalDocument, DIAGNOSTICS_REL, HAL_JSON, VND_ERROR_JSON};

use crate::context::RequestContext;
use crate::contract::{Contract, ResourceContract};
use crate::error::HalyardError;
use crate::error_render::ErrorRenderer;
use crate::render::Renderer;
use crate::resource::ResourceHandle;

/// What the outermost handler hands to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub max_age: Option<u64>,
    pub body: HalDocument,
}

impl RenderedResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// `Cache-Control` value, when a max-age is known.
    pub fn cache_control(&self) -> Option<String> {
        self.max_age.map(|secs| format!("max-age={secs}"))
    }
}

/// Runs renders for incoming requests and funnels every failure, panics
/// included, through the [`ErrorRenderer`].
#[derive(Clone)]
pub struct ResponseHandler {
    renderer: Renderer,
    errors: Arc<ErrorRenderer>,
}

impl ResponseHandler {
    pub fn new(renderer: Renderer, errors: Arc<ErrorRenderer>) -> Self {
        Self { renderer, errors }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub async fn respond(
        &self,
        ctx: &RequestContext,
        resource: ResourceHandle,
        contract: &Arc<Contract>,
    ) -> RenderedResponse {
        self.respond_with(ctx, self.renderer.render(ctx, resource, contract))
            .await
    }

    pub async fn respond_as<C: ResourceContract>(
        &self,
        ctx: &RequestContext,
        resource: ResourceHandle,
    ) -> RenderedResponse {
        self.respond_with(ctx, self.renderer.render_as::<C>(ctx, resource))
            .await
    }

    /// Awaits any document-producing future under the same error funnel.
    pub async fn respond_with<F>(&self, ctx: &RequestContext, fut: F) -> RenderedResponse
    where
        F: Future<Output = Result<HalDocument, HalyardError>>,
    {
        let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(HalyardError::other(format!(
                "request handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        match outcome {
            Ok(mut body) => {
                if ctx.embed_diagnostics() {
                    body.set_embedded(DIAGNOSTICS_REL, ctx.metrics().diagnostics());
                }
                RenderedResponse {
                    status: 200,
                    content_type: HAL_JSON,
                    max_age: ctx.metrics().effective_max_age(),
                    body,
                }
            }
            Err(err) => self.error_response(ctx, &err),
        }
    }

    pub fn error_response(&self, ctx: &RequestContext, err: &HalyardError) -> RenderedResponse {
        let rendered = self.errors.render(ctx, err);
        RenderedResponse {
            status: rendered.status,
            content_type: VND_ERROR_JSON,
            max_age: None,
            body: rendered.document,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
