use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Link, CURIES_REL, SELF_REL};

/// Value of a `_links` or `_embedded` entry: HAL allows either a single
/// object or an array for every relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relation<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Relation<T> {
    pub fn len(&self) -> usize {
        match self {
            Relation::Many(items) => items.len(),
            Relation::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Relation::Many(_))
    }

    pub fn first(&self) -> Option<&T> {
        match self {
            Relation::Many(items) => items.first(),
            Relation::One(item) => Some(item),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Relation::Many(items) => items.iter(),
            Relation::One(item) => std::slice::from_ref(item).iter(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Relation::Many(items) => items,
            Relation::One(item) => vec![item],
        }
    }

    /// Appends an item, turning a single entry into an array.
    pub fn push(&mut self, item: T) {
        match self {
            Relation::Many(items) => items.push(item),
            Relation::One(_) => {
                let previous = std::mem::replace(self, Relation::Many(Vec::with_capacity(2)));
                if let (Relation::One(first), Relation::Many(items)) = (previous, &mut *self) {
                    items.push(first);
                    items.push(item);
                }
            }
        }
    }
}

/// A HAL document: state fields at the top level plus `_links` and
/// `_embedded` multimaps keyed by relation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HalDocument {
    #[serde(flatten)]
    pub state: Map<String, Value>,
    #[serde(rename = "_links", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Relation<Link>>,
    #[serde(
        rename = "_embedded",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub embedded: BTreeMap<String, Relation<HalDocument>>,
}

impl HalDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document whose state is the given JSON object. Returns `None`
    /// when `state` is not an object.
    pub fn from_state(state: Value) -> Option<Self> {
        match state {
            Value::Object(map) => Some(Self {
                state: map,
                ..Self::default()
            }),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    pub fn with_self_link(mut self, link: Link) -> Self {
        self.set_self_link(link);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    pub fn self_link(&self) -> Option<&Link> {
        self.links.get(SELF_REL).and_then(Relation::first)
    }

    pub fn set_self_link(&mut self, link: Link) {
        self.links.insert(SELF_REL.to_string(), Relation::One(link));
    }

    /// Stores a single link for `rel`, replacing whatever was there.
    pub fn set_link(&mut self, rel: impl Into<String>, link: Link) {
        self.links.insert(rel.into(), Relation::One(link));
    }

    /// Appends a link for `rel`; the relation is always rendered as an array.
    pub fn push_link(&mut self, rel: impl Into<String>, link: Link) {
        self.links
            .entry(rel.into())
            .or_insert_with(|| Relation::Many(Vec::new()))
            .push(link);
    }

    pub fn set_embedded(&mut self, rel: impl Into<String>, doc: HalDocument) {
        self.embedded.insert(rel.into(), Relation::One(doc));
    }

    pub fn push_embedded(&mut self, rel: impl Into<String>, doc: HalDocument) {
        self.embedded
            .entry(rel.into())
            .or_insert_with(|| Relation::Many(Vec::new()))
            .push(doc);
    }

    pub fn links(&self, rel: &str) -> &[Link] {
        match self.links.get(rel) {
            Some(Relation::Many(items)) => items,
            Some(Relation::One(item)) => std::slice::from_ref(item),
            None => &[],
        }
    }

    pub fn embedded(&self, rel: &str) -> &[HalDocument] {
        match self.embedded.get(rel) {
            Some(Relation::Many(items)) => items,
            Some(Relation::One(item)) => std::slice::from_ref(item),
            None => &[],
        }
    }

    pub fn curies(&self) -> &[Link] {
        self.links(CURIES_REL)
    }

    pub fn has_state(&self) -> bool {
        !self.state.is_empty()
    }

    /// State fields as a standalone JSON object.
    pub fn state_value(&self) -> Value {
        Value::Object(self.state.clone())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(self.state.clone()))
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
