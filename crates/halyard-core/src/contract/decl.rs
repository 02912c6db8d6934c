use std::any::TypeId;
use std::fmt;

use super::model::EmbedPolicy;

/// Implemented by marker types that stand for a resource contract.
///
/// ```
/// use halyard_core::{ContractDecl, ContractRef, ContractRegistry, MemberDecl, ResourceContract, ReturnShape};
///
/// struct Item;
///
/// impl ResourceContract for Item {
///     const NAME: &'static str = "Item";
///
///     fn declare() -> ContractDecl {
///         ContractDecl::new(Self::NAME)
///             .member(MemberDecl::self_link("create_link", ReturnShape::One))
///             .member(MemberDecl::state("properties", ReturnShape::One))
///             .member(MemberDecl::relation("related", "related", ContractRef::of::<Item>(), ReturnShape::Many))
///     }
/// }
///
/// let contract = ContractRegistry::new().contract::<Item>().unwrap();
/// assert_eq!(contract.name(), "Item");
/// assert!(contract.relation("related").is_some());
/// ```
pub trait ResourceContract: 'static {
    const NAME: &'static str;

    fn declare() -> ContractDecl;
}

/// Reference from a relation to its target contract.
///
/// Typed references carry the declaration function so the registry can
/// validate targets lazily, which also makes self-referencing contracts work.
#[derive(Clone)]
pub struct ContractRef {
    name: String,
    type_id: Option<TypeId>,
    declare: Option<fn() -> ContractDecl>,
}

impl ContractRef {
    pub fn of<C: ResourceContract>() -> Self {
        Self {
            name: C::NAME.to_string(),
            type_id: Some(TypeId::of::<C>()),
            declare: Some(C::declare),
        }
    }

    /// Refers to a contract registered by name with
    /// [`ContractRegistry::register`](super::ContractRegistry::register).
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            declare: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub(crate) fn declaration(&self) -> Option<ContractDecl> {
        self.declare.map(|declare| declare())
    }
}

impl fmt::Debug for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRef")
            .field("name", &self.name)
            .field("typed", &self.type_id.is_some())
            .finish()
    }
}

impl PartialEq for ContractRef {
    fn eq(&self, other: &Self) -> bool {
        match (self.type_id, other.type_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

/// Container shape an accessor returns, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// Exactly one value.
    One,
    /// Zero or one value.
    Maybe,
    /// An ordered collection.
    Many,
    /// An asynchronous sequence.
    Stream,
    /// A future resolving to the inner shape.
    Future(Box<ReturnShape>),
    /// A shape known only to a registered [`ReturnShapeAdapter`](super::ReturnShapeAdapter).
    Named(String),
}

impl ReturnShape {
    pub fn future(inner: ReturnShape) -> Self {
        ReturnShape::Future(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        ReturnShape::Named(name.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMarker {
    pub name: String,
    pub target: ContractRef,
    pub embed: EmbedPolicy,
}

impl RelationMarker {
    pub fn new(name: impl Into<String>, target: ContractRef) -> Self {
        Self {
            name: name.into(),
            target,
            embed: EmbedPolicy::Link,
        }
    }

    pub fn with_embed(mut self, embed: EmbedPolicy) -> Self {
        self.embed = embed;
        self
    }
}

/// Declarative tag on a contract member.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    SelfLink,
    State,
    Relation(RelationMarker),
    /// Resolved through a registered [`MarkerAdapter`](super::MarkerAdapter).
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDecl {
    pub name: String,
    pub template_variable: bool,
    pub required: bool,
}

impl ParameterDecl {
    /// A required template variable.
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_variable: true,
            required: true,
        }
    }

    pub fn optional_variable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_variable: true,
            required: false,
        }
    }

    /// A parameter without a template-variable tag; rejected on relations.
    pub fn untagged(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_variable: false,
            required: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDecl {
    pub accessor: String,
    pub markers: Vec<Marker>,
    pub shape: ReturnShape,
    pub parameters: Vec<ParameterDecl>,
}

impl MemberDecl {
    pub fn new(accessor: impl Into<String>, shape: ReturnShape) -> Self {
        Self {
            accessor: accessor.into(),
            markers: Vec::new(),
            shape,
            parameters: Vec::new(),
        }
    }

    pub fn self_link(accessor: impl Into<String>, shape: ReturnShape) -> Self {
        Self::new(accessor, shape).marked(Marker::SelfLink)
    }

    pub fn state(accessor: impl Into<String>, shape: ReturnShape) -> Self {
        Self::new(accessor, shape).marked(Marker::State)
    }

    pub fn relation(
        accessor: impl Into<String>,
        name: impl Into<String>,
        target: ContractRef,
        shape: ReturnShape,
    ) -> Self {
        Self::new(accessor, shape).marked(Marker::Relation(RelationMarker::new(name, target)))
    }

    pub fn marked(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Sets the embed policy of every relation marker on this member.
    pub fn with_embed(mut self, embed: EmbedPolicy) -> Self {
        for marker in &mut self.markers {
            if let Marker::Relation(rel) = marker {
                rel.embed = embed;
            }
        }
        self
    }

    pub fn embedded(self) -> Self {
        self.with_embed(EmbedPolicy::Embed)
    }

    pub fn param(mut self, param: ParameterDecl) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn variable(self, name: impl Into<String>) -> Self {
        self.param(ParameterDecl::variable(name))
    }

    pub fn optional_variable(self, name: impl Into<String>) -> Self {
        self.param(ParameterDecl::optional_variable(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurieDecl {
    pub prefix: String,
    pub href: String,
}

/// Explicit, unvalidated description of a resource contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDecl {
    pub name: String,
    pub members: Vec<MemberDecl>,
    pub curies: Vec<CurieDecl>,
}

impl ContractDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            curies: Vec::new(),
        }
    }

    pub fn member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    /// Declares a documentation prefix; `href` must contain `{rel}`.
    pub fn curie(mut self, prefix: impl Into<String>, href: impl Into<String>) -> Self {
        self.curies.push(CurieDecl {
            prefix: prefix.into(),
            href: href.into(),
        });
        self
    }
}
