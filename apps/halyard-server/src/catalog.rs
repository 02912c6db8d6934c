//! The demo catalog: contracts shared by the API and the proxy, plus the
//! in-memory data the API renders.

use std::collections::BTreeMap;
use std::sync::Arc;

use halyard_core::protocol::Link;
use halyard_core::{
    handle, ContractDecl, ContractRef, Emission, HalyardError, LinkedResource, MemberDecl,
    RenderableResource, ResourceContract, ResourceHandle, ReturnShape, ServerLogicError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CURIE_PREFIX: &str = "shop";
const CURIE_DOCS: &str = "/docs/rels/{rel}";

pub struct ApiRoot;

impl ResourceContract for ApiRoot {
    const NAME: &'static str = "ApiRoot";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .curie(CURIE_PREFIX, CURIE_DOCS)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("summary", ReturnShape::One))
            .member(MemberDecl::relation(
                "products",
                "shop:product",
                ContractRef::of::<Product>(),
                ReturnShape::Stream,
            ))
            .member(
                MemberDecl::relation(
                    "product_by_id",
                    "shop:find",
                    ContractRef::of::<Product>(),
                    ReturnShape::One,
                )
                .variable("id"),
            )
            .member(
                MemberDecl::relation(
                    "categories",
                    "shop:category",
                    ContractRef::of::<Category>(),
                    ReturnShape::Many,
                )
                .embedded(),
            )
    }
}

pub struct Product;

impl ResourceContract for Product {
    const NAME: &'static str = "Product";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .curie(CURIE_PREFIX, CURIE_DOCS)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state(
                "props",
                ReturnShape::future(ReturnShape::One),
            ))
            .member(MemberDecl::relation(
                "category",
                "shop:category",
                ContractRef::of::<Category>(),
                ReturnShape::One,
            ))
            .member(MemberDecl::relation(
                "similar",
                "shop:similar",
                ContractRef::of::<Product>(),
                ReturnShape::Stream,
            ))
    }
}

pub struct Category;

impl ResourceContract for Category {
    const NAME: &'static str = "Category";

    fn declare() -> ContractDecl {
        ContractDecl::new(Self::NAME)
            .member(MemberDecl::self_link("link", ReturnShape::One))
            .member(MemberDecl::state("props", ReturnShape::One))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProps {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProps {
    pub slug: String,
    pub title: String,
}

pub fn product_path(id: u32) -> String {
    format!("/products/{id}")
}

pub fn category_path(slug: &str) -> String {
    format!("/categories/{slug}")
}

/// Products and categories served by the API.
#[derive(Debug, Default)]
pub struct Store {
    products: BTreeMap<u32, ProductProps>,
    categories: BTreeMap<String, CategoryProps>,
}

impl Store {
    pub fn demo() -> Self {
        let mut store = Self::default();
        for (slug, title) in [("lighting", "Lighting"), ("furniture", "Furniture")] {
            store.categories.insert(
                slug.to_string(),
                CategoryProps {
                    slug: slug.into(),
                    title: title.into(),
                },
            );
        }
        for (id, name, price, category) in [
            (1, "desk lamp", 39.0, "lighting"),
            (2, "floor lamp", 89.5, "lighting"),
            (3, "oak desk", 420.0, "furniture"),
            (4, "office chair", 215.0, "furniture"),
        ] {
            store.products.insert(
                id,
                ProductProps {
                    id,
                    name: name.into(),
                    price,
                    category: category.into(),
                },
            );
        }
        store
    }

    pub fn product(&self, id: u32) -> Option<&ProductProps> {
        self.products.get(&id)
    }

    pub fn category(&self, slug: &str) -> Option<&CategoryProps> {
        self.categories.get(slug)
    }
}

pub struct RootResource {
    pub store: Arc<Store>,
}

impl RenderableResource for RootResource {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new("/").with_title("demo catalog")))
    }

    fn state(&self) -> Emission<Value> {
        Emission::one(serde_json::json!({
            "name": "demo catalog",
            "productCount": self.store.products.len(),
        }))
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        let store = Arc::clone(&self.store);
        match rel {
            "shop:product" => {
                let ids: Vec<u32> = store.products.keys().copied().collect();
                Emission::stream(futures_util::stream::iter(ids.into_iter().map(move |id| {
                    ProductResource::load(&store, id).map(handle)
                })))
            }
            "shop:find" => Emission::one(handle(LinkedResource(Link::new("/products/{id}")))),
            "shop:category" => Emission::many(
                store
                    .categories
                    .values()
                    .cloned()
                    .map(|props| handle(CategoryResource(props))),
            ),
            _ => Emission::empty(),
        }
    }
}

pub struct ProductResource {
    store: Arc<Store>,
    props: ProductProps,
}

impl ProductResource {
    pub fn load(store: &Arc<Store>, id: u32) -> Result<Self, HalyardError> {
        let props = store
            .product(id)
            .cloned()
            .ok_or_else(|| ServerLogicError::not_found(format!("no product with id {id}")))?;
        Ok(Self {
            store: Arc::clone(store),
            props,
        })
    }
}

impl RenderableResource for ProductResource {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(
            Link::new(product_path(self.props.id)).with_title(self.props.name.clone()),
        ))
    }

    fn state(&self) -> Emission<Value> {
        let props = self.props.clone();
        Emission::future_one(async move { serde_json::to_value(props).map_err(anyhow::Error::from) })
    }

    fn relation(&self, rel: &str) -> Emission<ResourceHandle> {
        match rel {
            "shop:category" => match self.store.category(&self.props.category) {
                Some(props) => Emission::one(handle(CategoryResource(props.clone()))),
                None => Emission::failed(anyhow::anyhow!(
                    "product {} references unknown category {}",
                    self.props.id,
                    self.props.category
                )),
            },
            "shop:similar" => {
                let similar: Vec<ResourceHandle> = self
                    .store
                    .products
                    .values()
                    .filter(|other| other.category == self.props.category && other.id != self.props.id)
                    .map(|other| {
                        handle(ProductResource {
                            store: Arc::clone(&self.store),
                            props: other.clone(),
                        })
                    })
                    .collect();
                Emission::many(similar)
            }
            _ => Emission::empty(),
        }
    }
}

pub struct CategoryResource(pub CategoryProps);

impl RenderableResource for CategoryResource {
    fn self_link(&self) -> Result<Option<Link>, HalyardError> {
        Ok(Some(Link::new(category_path(&self.0.slug)).with_title(self.0.title.clone())))
    }

    fn state(&self) -> Emission<Value> {
        Emission::state(&self.0)
    }
}
