//! Re-renders upstream catalog documents through the navigation client.
//!
//! Every upstream resource is bound lazily and wrapped in a [`Mirror`], so the
//! renderer only fetches what the contract asks it to embed or read. Links are
//! rewritten to point back under `/proxy`.

use std::sync::Arc;

use halyard_core::protocol::{HalDocument, Link};
use halyard_core::{
    handle, ContractRef, Emission, HalyardError, LinkedResource, NavigableResource, Params,
    RenderableResource, RequestContext, ResourceHandle, ServerLogicError,
};
use serde_json::Value;

use crate::catalog::{ApiRoot, Category, Product};
use crate::state::AppState;

pub const PROXY_PREFIX: &str = "/proxy";

/// Maps upstream hrefs onto proxy paths.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    upstream: String,
}

impl LinkRewriter {
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn upstream_uri(&self, path: &str) -> String {
        format!("{}/{}", self.upstream, path.trim_start_matches('/'))
    }

    pub fn rewrite(&self, link: &Link) -> Link {
        let upstream_path = link
            .href
            .strip_prefix(&self.upstream)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'));
        let path = match upstream_path {
            Some(rest) => rest,
            None if link.href.starts_with('/') => link.href.as_str(),
            None => return link.clone(),
        };
        let path = if path.is_empty() { "/" } else { path };
        let mut rewritten = link.clone();
        rewritten.href = if path == "/" {
            PROXY_PREFIX.to_string()
        } else {
            format!("{PROXY_PREFIX}{path}")
        };
        rewritten
    }
}

/// A navigable upstream resource presented as a renderable one.
pub struct Mirror {
    nav: NavigableResource,
    rewriter: Arc<LinkRewriter>,
}

impl Mirror {
    pub fn new(nav: NavigableResource, rewriter: Arc<LinkRewriter>) -> Self {
        Self { nav, rewriter }
    }
}

impl RenderableResource for Mirror {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        self.nav.self_link().map(|link| Some(self.rewriter.rewrite(&link)))
    }

    fn state(&self) -> Emission<Value> {
        let nav = self.nav.clone();
        Emission::future_maybe(async move { nav.optional_state::<Value>().await })
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        let nav = self.nav.clone();
        let rewriter = Arc::clone(&self.rewriter);
        let rel = rel.to_string();
        Emission::future(async move {
            let templated = nav
                .contract()
                .relation(&rel)
                .is_some_and(|relation| relation.required_variables().next().is_some());
            if templated {
                let links = nav.document().await?.links(&rel).to_vec();
                return Ok::<_, HalyardError>(
                    links
                        .iter()
                        .map(|link| handle(LinkedResource(rewriter.rewrite(link))))
                        .collect(),
                );
            }
            let entries = nav.relation(&rel, &Params::new()).await?;
            Ok(entries
                .into_iter()
                .map(|entry| handle(Mirror::new(entry, Arc::clone(&rewriter))))
                .collect())
        })
    }
}

/// The contract a proxied path is expected to satisfy.
fn contract_for(path: &str) -> Option<ContractRef> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => Some(ContractRef::of::<ApiRoot>()),
        ["products", _] => Some(ContractRef::of::<Product>()),
        ["categories", _] => Some(ContractRef::of::<Category>()),
        _ => None,
    }
}

/// Fetches `path` from the upstream catalog and renders it with proxy links.
pub async fn mirror(
    state: &AppState,
    ctx: &RequestContext,
    path: &str,
) -> Result<HalDocument, HalyardError> {
    let reference = contract_for(path)
        .ok_or_else(|| ServerLogicError::not_found(format!("nothing to proxy at /{path}")))?;
    let engine = &state.engine;
    let contract = engine.registry().resolve(&reference)?;
    let nav = engine
        .client()
        .bind(ctx, &contract, state.rewriter.upstream_uri(path));
    engine
        .renderer()
        .render(ctx, handle(Mirror::new(nav, Arc::clone(&state.rewriter))), &contract)
        .await
}

/// The cheapest product, found by walking the upstream catalog.
pub async fn cheapest(state: &AppState, ctx: &RequestContext) -> Result<HalDocument, HalyardError> {
    let root = state
        .engine
        .client()
        .entry_point::<ApiRoot>(ctx, &state.rewriter.upstream_uri("/"))?;
    let mut best: Option<(f64, NavigableResource)> = None;
    for product in root.many("shop:product").await? {
        let props: crate::catalog::ProductProps = product.state().await?;
        if best.as_ref().is_none_or(|(price, _)| props.price < *price) {
            best = Some((props.price, product));
        }
    }
    let (_, product) = best.ok_or_else(|| ServerLogicError::not_found("catalog is empty"))?;
    let contract = state.engine.registry().resolve(&ContractRef::of::<Product>())?;
    state
        .engine
        .renderer()
        .render(ctx, handle(Mirror::new(product, Arc::clone(&state.rewriter))), &contract)
        .await
}
