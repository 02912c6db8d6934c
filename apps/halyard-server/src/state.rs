use std::sync::Arc;

use halyard_core::Halyard;

use crate::catalog::Store;
use crate::proxy::LinkRewriter;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Halyard>,
    pub store: Arc<Store>,
    pub rewriter: Arc<LinkRewriter>,
}

impl AppState {
    pub fn new(engine: Halyard, store: Store, upstream: impl Into<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(store),
            rewriter: Arc::new(LinkRewriter::new(upstream)),
        }
    }
}
