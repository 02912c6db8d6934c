use std::sync::Arc;

use halyard_protocol::Link;
use serde_json::Value;

use crate::emission::Emission;
use crate::error::HalyardError;

pub type ResourceHandle = Arc<dyn RenderableResource>;

/// Server-side implementation of a resource contract.
///
/// The renderer calls only the members the contract declares: `self_link`
/// when it has a self-link member, `state` when it has a state member and
/// `relation` once per declared relation name.
pub trait RenderableResource: Send + Sync + 'static {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(None)
    }

    fn state(&self) -> Emission<Value> {
        Emission::empty()
    }

    fn relation(&self, _rel: &str) -> Emission<ResourceHandle> {
        Emission::empty()
    }
}

pub fn handle<R: RenderableResource>(resource: R) -> ResourceHandle {
    Arc::new(resource)
}

/// A resource known only by its link, e.g. an external or upstream URI that
/// should be linked but never rendered here.
#[derive(Debug, Clone)]
pub struct LinkedResource(pub Link);

impl RenderableResource for LinkedResource {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(self.0.clone()))
    }
}
