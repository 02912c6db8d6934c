//! Contract declarations, their validation and the registry that caches the
//! validated descriptors.
//!
//! A contract is declared once as a [`ContractDecl`] value (usually from a
//! [`ResourceContract::declare`] implementation). The introspector classifies
//! every declared member into self link, state or relation and rejects
//! ambiguous declarations; the resulting [`Contract`] is immutable and shared
//! by the renderer and the navigation client.

mod decl;
mod introspect;
mod model;
mod registry;

pub use decl::{
    ContractDecl, ContractRef, CurieDecl, Marker, MemberDecl, ParameterDecl, RelationMarker,
    ResourceContract, ReturnShape,
};
pub use introspect::{introspect, MarkerAdapter, ReturnShapeAdapter};
pub use model::{
    Cardinality, Contract, Curie, EmbedPolicy, RelationMember, SelfLinkMember, StateMember,
    TemplateVariable,
};
pub use registry::{ContractRegistry, ContractRegistryBuilder};
