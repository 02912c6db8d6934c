#![allow(dead_code)]

use std::sync::Arc;

use halyard_core::fetch::{
    CachingLoader, ManualClock, MemoryCacheStore, ScriptedTransport, TransportLoader,
    TransportResponse,
};
use halyard_core::protocol::{HalDocument, Link};
use halyard_core::{
    handle, ContractDecl, ContractRef, ContractRegistry, Emission, HalClient, HalyardError,
    MemberDecl, RenderableResource, Renderer, RequestContext, ResourceContract, ResourceHandle,
    ReturnShape,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BASE: &str = "http://api.test";

pub struct Catalog;

impl ResourceContract for Catalog {
    const NAME: &'static str = "Catalog";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("summary", ReturnShape::One))
            .member(MemberDecl::relation(
                "items",
                "item",
                ContractRef::of::<Item>(),
                ReturnShape::Stream,
            ))
            .member(
                MemberDecl::relation(
                    "item_by_id",
                    "find",
                    ContractRef::of::<Item>(),
                    ReturnShape::One,
                )
                .variable("id"),
            )
    }
}

pub struct Item;

impl ResourceContract for Item {
    const NAME: &'static str = "Item";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("props", ReturnShape::future(ReturnShape::One)))
            .member(MemberDecl::relation(
                "related",
                "related",
                ContractRef::of::<Item>(),
                ReturnShape::Maybe,
            ))
            .member(
                MemberDecl::relation("tags", "tag", ContractRef::of::<Tag>(), ReturnShape::Many)
                    .embedded(),
            )
    }
}

pub struct Tag;

impl ResourceContract for Tag {
    const NAME: &'static str = "Tag";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::Maybe))
            .member(MemberDecl::state("props", ReturnShape::One))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProps {
    pub id: u32,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagProps {
    pub label: String,
}

#[derive(Clone)]
pub struct ItemImpl {
    pub props: ItemProps,
    pub related: Option<u32>,
    pub tags: Vec<&'static str>,
}

pub fn item_uri(id: u32) -> String {
    format!("{BASE}/items/{id}")
}

impl RenderableResource for ItemImpl {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new(item_uri(self.props.id)).with_title(self.props.name.clone())))
    }

    fn state(&self) -> Emission<Value> {
        let props = self.props.clone();
        Emission::future_one(async move {
            serde_json::to_value(props).map_err(|err| HalyardError::Other(err.into()))
        })
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        match rel {
            "related" => Emission::maybe(self.related.map(|id| {
                handle(ItemImpl {
                    props: ItemProps {
                        id,
                        name: format!("item {id}"),
                        price: 1.0,
                    },
                    related: None,
                    tags: vec![],
                })
            })),
            "tag" => Emission::many(
                self.tags
                    .iter()
                    .map(|label| handle(TagImpl(label.to_string())))
                    .collect::<Vec<_>>(),
            ),
            _ => Emission::empty(),
        }
    }
}

pub struct TagImpl(pub String);

impl RenderableResource for TagImpl {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(None)
    }

    fn state(&self) -> Emission<Value> {
        Emission::state(&TagProps {
            label: self.0.clone(),
        })
    }
}

pub struct CatalogImpl {
    pub items: Vec<ItemImpl>,
}

impl RenderableResource for CatalogImpl {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new(format!("{BASE}/")).with_title("Catalog")))
    }

    fn state(&self) -> Emission<Value> {
        Emission::one(serde_json::json!({"name": "demo", "count": self.items.len()}))
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        match rel {
            "item" => Emission::stream(futures_util::stream::iter(
                self.items
                    .iter()
                    .cloned()
                    .map(|item| Ok::<_, HalyardError>(handle(item)))
                    .collect::<Vec<_>>(),
            )),
            "find" => Emission::one(handle(halyard_core::LinkedResource(Link::new(format!(
                "{BASE}/items/{{id}}"
            ))))),
            _ => Emission::empty(),
        }
    }
}

pub fn sample_items() -> Vec<ItemImpl> {
    vec![
        ItemImpl {
            props: ItemProps {
                id: 3,
                name: "lamp".into(),
                price: 19.5,
            },
            related: Some(1),
            tags: vec!["home", "light"],
        },
        ItemImpl {
            props: ItemProps {
                id: 1,
                name: "desk".into(),
                price: 120.0,
            },
            related: None,
            tags: vec![],
        },
        ItemImpl {
            props: ItemProps {
                id: 2,
                name: "chair".into(),
                price: 45.0,
            },
            related: Some(1),
            tags: vec!["home"],
        },
    ]
}

/// Renders `resource` and scripts the result as the upstream answer for its
/// self link.
pub async fn publish<C: ResourceContract>(
    harness: &Harness,
    resource: ResourceHandle,
    max_age: Option<u64>,
) -> HalDocument {
    let renderer = Renderer::new(Arc::clone(&harness.registry));
    let doc = renderer
        .render_as::<C>(&RequestContext::new(), resource)
        .await
        .expect("render for publishing");
    let uri = doc.self_link().expect("published documents have a self link").href.clone();
    harness
        .transport
        .respond(uri, TransportResponse::hal(200, &doc.to_value(), max_age));
    doc
}

/// Publishes the catalog root and every item it lists.
pub async fn publish_catalog(harness: &Harness, items: Vec<ItemImpl>) {
    for item in &items {
        publish::<Item>(harness, handle(item.clone()), Some(60)).await;
    }
    publish::<Catalog>(harness, handle(CatalogImpl { items }), Some(60)).await;
}

/// A client over a scripted upstream with a manual clock and memory cache.
pub struct Harness {
    pub registry: Arc<ContractRegistry>,
    pub transport: ScriptedTransport,
    pub clock: ManualClock,
    pub store: MemoryCacheStore,
    pub loader: Arc<CachingLoader>,
    pub client: HalClient,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Arc::new(ContractRegistry::new());
        let transport = ScriptedTransport::new();
        let clock = ManualClock::default();
        let store = MemoryCacheStore::new();
        let inner = TransportLoader::with_clock(Arc::new(transport.clone()), Arc::new(clock.clone()));
        let loader = Arc::new(
            CachingLoader::new(Arc::new(inner), Arc::new(store.clone()))
                .with_clock(Arc::new(clock.clone())),
        );
        let client = HalClient::new(Arc::clone(&registry), loader.clone());
        Self {
            registry,
            transport,
            clock,
            store,
            loader,
            client,
        }
    }
}
