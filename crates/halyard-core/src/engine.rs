use std::sync::Arc;

use anyhow::Context;

use crate::client::HalClient;
use crate::config::HalyardConfig;
use crate::context::RequestContext;
use crate::contract::{ContractRef, ContractRegistry, ResourceContract};
use crate::error_render::{ErrorRenderer, StatusStrategy};
use crate::fetch::{
    CacheStatsSnapshot, CacheStore, CachingLoader, Clock, HttpTransport, MokaCacheStore,
    ReqwestTransport, ResourceLoader, SystemClock, TransportLoader,
};
use crate::handler::ResponseHandler;
use crate::render::Renderer;

/// The assembled pipeline: one registry, one loader stack, one renderer and
/// error funnel, shared by every request.
pub struct Halyard {
    config: HalyardConfig,
    registry: Arc<ContractRegistry>,
    client: HalClient,
    handler: ResponseHandler,
    errors: Arc<ErrorRenderer>,
    cache: Option<Arc<CachingLoader>>,
}

impl Halyard {
    pub fn builder() -> HalyardBuilder {
        HalyardBuilder::default()
    }

    pub fn config(&self) -> &HalyardConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &HalClient {
        &self.client
    }

    pub fn renderer(&self) -> &Renderer {
        self.handler.renderer()
    }

    pub fn handler(&self) -> &ResponseHandler {
        &self.handler
    }

    pub fn errors(&self) -> &Arc<ErrorRenderer> {
        &self.errors
    }

    pub fn cache_stats(&self) -> Option<CacheStatsSnapshot> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// A fresh context for one request, honoring the `[render]` settings.
    pub fn request(&self, uri: impl Into<String>) -> RequestContext {
        let ctx = RequestContext::for_uri(uri)
            .with_embed_diagnostics(self.config.render.embed_diagnostics);
        if let Some(ceiling) = self.config.render.max_age_ceiling_secs {
            ctx.limit_max_age(ceiling);
        }
        ctx
    }
}

#[derive(Default)]
pub struct HalyardBuilder {
    config: HalyardConfig,
    registry: Option<ContractRegistry>,
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn CacheStore>>,
    clock: Option<Arc<dyn Clock>>,
    strategies: Vec<Arc<dyn StatusStrategy>>,
    roots: Vec<ContractRef>,
}

impl HalyardBuilder {
    pub fn config(mut self, config: HalyardConfig) -> Self {
        self.config = config;
        self
    }

    /// A registry carrying custom marker or return shape adapters.
    pub fn registry(mut self, registry: ContractRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn status_strategy(mut self, strategy: Arc<dyn StatusStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Validates `C` and everything reachable from it when building.
    pub fn contract<C: ResourceContract>(mut self) -> Self {
        self.roots.push(ContractRef::of::<C>());
        self
    }

    pub fn build(self) -> anyhow::Result<Halyard> {
        let registry = Arc::new(self.registry.unwrap_or_default());
        for root in &self.roots {
            let graph = registry
                .validate_graph(root)
                .with_context(|| format!("validating contract graph of {}", root.name()))?;
            tracing::debug!(root = root.name(), contracts = graph.len(), "contract graph valid");
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::from_config(&self.config.http)
                    .context("building http transport")?,
            ),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let base: Arc<dyn ResourceLoader> =
            Arc::new(TransportLoader::with_clock(transport, Arc::clone(&clock)));

        let cache = if self.config.cache.enabled {
            let store: Arc<dyn CacheStore> = self
                .store
                .unwrap_or_else(|| Arc::new(MokaCacheStore::from_config(&self.config.cache)));
            Some(Arc::new(
                CachingLoader::from_config(base.clone(), store, &self.config.cache)
                    .with_clock(clock),
            ))
        } else {
            None
        };
        let loader: Arc<dyn ResourceLoader> = match &cache {
            Some(cache) => Arc::clone(cache) as Arc<dyn ResourceLoader>,
            None => base,
        };

        let errors = Arc::new(
            self.strategies
                .into_iter()
                .fold(ErrorRenderer::new(), ErrorRenderer::with_strategy),
        );
        let renderer = Renderer::new(Arc::clone(&registry));
        tracing::info!(
            cache = self.config.cache.enabled,
            single_flight = self.config.cache.single_flight,
            "halyard engine ready"
        );
        Ok(Halyard {
            client: HalClient::new(Arc::clone(&registry), loader),
            handler: ResponseHandler::new(renderer, Arc::clone(&errors)),
            errors,
            registry,
            cache,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractDecl, MemberDecl, ReturnShape};
    use crate::fetch::ScriptedTransport;

    struct Dangling;

    impl ResourceContract for Dangling {
        const NAME: &'static str = "Dangling";

        fn declare() -> ContractDecl {
            ContractDecl::new(Self::NAME).member(MemberDecl::relation(
                "next",
                "next",
                ContractRef::named("Elsewhere"),
                ReturnShape::One,
            ))
        }
    }

    #[test]
    fn build_fails_on_invalid_contract_graph() {
        let err = Halyard::builder()
            .transport(Arc::new(ScriptedTransport::new()))
            .contract::<Dangling>()
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Dangling"));
    }

    #[test]
    fn request_contexts_honor_render_settings() {
        let mut config = HalyardConfig::default();
        config.render.embed_diagnostics = true;
        config.render.max_age_ceiling_secs = Some(15);
        config.cache.enabled = false;
        let engine = Halyard::builder()
            .config(config)
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap();
        let ctx = engine.request("/x");
        assert!(ctx.embed_diagnostics());
        assert_eq!(ctx.metrics().effective_max_age(), Some(15));
        assert!(engine.cache_stats().is_none());
    }
}
