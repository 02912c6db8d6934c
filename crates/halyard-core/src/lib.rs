//! Contract-driven HAL resources.
//!
//! A resource is declared once as a contract: a self link, at most one state
//! payload and named relations to other contracts. The same validated
//! [`contract::Contract`] drives both sides of the wire:
//!
//! - the [`render::Renderer`] turns a server-side [`resource::RenderableResource`]
//!   into a HAL document, running every relation branch concurrently;
//! - the [`client::HalClient`] binds lazily navigating
//!   [`client::NavigableResource`]s that fetch documents through a cached
//!   [`fetch::ResourceLoader`] on first use.
//!
//! Failures of either side are funneled through the
//! [`error_render::ErrorRenderer`] into error documents, and every request
//! collects timing and max-age data in its [`metrics::RequestMetrics`].

pub mod client;
pub mod config;
pub mod context;
pub mod contract;
pub mod emission;
mod engine;
pub mod error;
pub mod error_render;
pub mod fetch;
pub mod handler;
pub mod metrics;
pub mod render;
pub mod resource;
pub mod template;

pub use halyard_protocol as protocol;

pub use client::{HalClient, NavigableResource, Source};
pub use config::{load_config, load_default, ConfigError, HalyardConfig};
pub use context::RequestContext;
pub use contract::{
    Cardinality, Contract, ContractDecl, ContractRef, ContractRegistry, EmbedPolicy, MemberDecl,
    ResourceContract, ReturnShape,
};
pub use emission::Emission;
pub use engine::{Halyard, HalyardBuilder};
pub use error::{ClientFetchError, ContractError, HalyardError, ServerLogicError};
pub use error_render::{DefaultStatusStrategy, ErrorRenderer, ErrorResponse, StatusStrategy};
pub use handler::{RenderedResponse, ResponseHandler};
pub use metrics::{RequestMetrics, UpstreamTiming};
pub use render::Renderer;
pub use resource::{handle, LinkedResource, RenderableResource, ResourceHandle};
pub use template::{Params, TemplateValue};
