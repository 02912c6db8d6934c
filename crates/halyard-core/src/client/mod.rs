//! Lazily navigating client for contract-described HAL APIs.

mod navigable;

use std::sync::Arc;

use halyard_protocol::{HalDocument, Link};

use crate::context::RequestContext;
use crate::contract::{Contract, ContractRegistry, ResourceContract};
use crate::error::ContractError;
use crate::fetch::ResourceLoader;

pub use navigable::NavigableResource;

/// Where a bound resource comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Fetched on first use.
    Link(Link),
    /// Already resolved, e.g. an embedded entry or a locally built document.
    Document {
        document: HalDocument,
        /// Base for relative hrefs inside the document.
        base: Option<String>,
    },
}

impl Source {
    pub fn document(document: HalDocument) -> Self {
        Source::Document {
            document,
            base: None,
        }
    }
}

impl From<Link> for Source {
    fn from(link: Link) -> Self {
        Source::Link(link)
    }
}

impl From<&str> for Source {
    fn from(uri: &str) -> Self {
        Source::Link(Link::new(uri))
    }
}

impl From<String> for Source {
    fn from(uri: String) -> Self {
        Source::Link(Link::new(uri))
    }
}

impl From<HalDocument> for Source {
    fn from(document: HalDocument) -> Self {
        Source::document(document)
    }
}

/// Entry point for client navigation. Binding is pure; documents are fetched
/// through the loader when a bound resource is first read.
#[derive(Clone)]
pub struct HalClient {
    registry: Arc<ContractRegistry>,
    loader: Arc<dyn ResourceLoader>,
}

impl HalClient {
    pub fn new(registry: Arc<ContractRegistry>, loader: Arc<dyn ResourceLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    pub fn bind(
        &self,
        ctx: &RequestContext,
        contract: &Arc<Contract>,
        source: impl Into<Source>,
    ) -> NavigableResource {
        NavigableResource::bind(self.clone(), ctx.clone(), Arc::clone(contract), source.into(), None)
    }

    pub fn bind_as<C: ResourceContract>(
        &self,
        ctx: &RequestContext,
        source: impl Into<Source>,
    ) -> Result<NavigableResource, ContractError> {
        let contract = self.registry.contract::<C>()?;
        Ok(self.bind(ctx, &contract, source))
    }

    /// Binds the API root at `uri` as contract `C`.
    pub fn entry_point<C: ResourceContract>(
        &self,
        ctx: &RequestContext,
        uri: &str,
    ) -> Result<NavigableResource, ContractError> {
        self.bind_as::<C>(ctx, uri)
    }

    pub(crate) fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }
}
