use std::collections::HashSet;
use std::sync::Arc;

use halyard_protocol::{CURIES_REL, SELF_REL};

use super::decl::{ContractDecl, Marker, MemberDecl, ParameterDecl, ReturnShape};
use super::model::{
    Cardinality, Contract, Curie, RelationMember, SelfLinkMember, StateMember, TemplateVariable,
};
use crate::error::ContractError;

/// Maps an alternate declarative marker onto one of the standard markers.
pub trait MarkerAdapter: Send + Sync {
    fn resolve(&self, marker: &str, member: &MemberDecl) -> Option<Marker>;
}

/// Teaches the introspector an additional return shape by mapping it onto a
/// known one (for example a paging type onto [`ReturnShape::Stream`]).
pub trait ReturnShapeAdapter: Send + Sync {
    fn resolve(&self, shape: &str) -> Option<ReturnShape>;
}

const MAX_SHAPE_ALIAS_DEPTH: usize = 4;

/// Validates a declaration and classifies its members.
pub fn introspect(
    decl: &ContractDecl,
    marker_adapters: &[Arc<dyn MarkerAdapter>],
    shape_adapters: &[Arc<dyn ReturnShapeAdapter>],
) -> Result<Contract, ContractError> {
    let contract = decl.name.trim();
    if contract.is_empty() {
        return Err(ContractError::invalid("<unnamed>", "contract name is empty"));
    }
    let invalid = |detail: String| ContractError::invalid(contract, detail);

    let mut accessors = HashSet::new();
    let mut self_link: Option<SelfLinkMember> = None;
    let mut state: Option<StateMember> = None;
    let mut relations: Vec<RelationMember> = Vec::new();

    for member in &decl.members {
        if !accessors.insert(member.accessor.as_str()) {
            return Err(invalid(format!(
                "accessor '{}' is declared more than once",
                member.accessor
            )));
        }
        let marker = resolve_marker(member, marker_adapters).map_err(&invalid)?;
        let cardinality = classify(&member.shape, shape_adapters, 0).map_err(|detail| {
            invalid(format!("accessor '{}': {detail}", member.accessor))
        })?;

        match marker {
            Marker::SelfLink => {
                if self_link.is_some() {
                    return Err(invalid("more than one self link accessor".into()));
                }
                if cardinality == Cardinality::Many {
                    return Err(invalid(format!(
                        "self link accessor '{}' must return one or zero links",
                        member.accessor
                    )));
                }
                self_link = Some(SelfLinkMember {
                    accessor: member.accessor.clone(),
                    required: cardinality == Cardinality::Single,
                    template_variables: template_variables(member).map_err(&invalid)?,
                });
            }
            Marker::State => {
                if state.is_some() {
                    return Err(invalid("more than one state accessor".into()));
                }
                if cardinality == Cardinality::Many {
                    return Err(invalid(format!(
                        "state accessor '{}' must return one or zero values",
                        member.accessor
                    )));
                }
                if !member.parameters.is_empty() {
                    return Err(invalid(format!(
                        "state accessor '{}' must not declare parameters",
                        member.accessor
                    )));
                }
                state = Some(StateMember {
                    accessor: member.accessor.clone(),
                    required: cardinality == Cardinality::Single,
                });
            }
            Marker::Relation(rel) => {
                let name = rel.name.trim();
                if name.is_empty() {
                    return Err(invalid(format!(
                        "relation accessor '{}' has an empty relation name",
                        member.accessor
                    )));
                }
                if name == SELF_REL || name == CURIES_REL {
                    return Err(invalid(format!("relation name '{name}' is reserved")));
                }
                if relations.iter().any(|existing| existing.name == name) {
                    return Err(invalid(format!(
                        "relation '{name}' is declared more than once"
                    )));
                }
                relations.push(RelationMember {
                    accessor: member.accessor.clone(),
                    name: name.to_string(),
                    cardinality,
                    embed: rel.embed,
                    target: rel.target,
                    template_variables: template_variables(member).map_err(&invalid)?,
                });
            }
            Marker::Custom(name) => {
                return Err(invalid(format!("unresolved marker '{name}'")));
            }
        }
    }

    let mut curies: Vec<Curie> = Vec::new();
    for curie in &decl.curies {
        let prefix = curie.prefix.trim();
        if prefix.is_empty() || prefix.contains(':') {
            return Err(invalid(format!("invalid curie prefix '{}'", curie.prefix)));
        }
        if !curie.href.contains("{rel}") {
            return Err(invalid(format!(
                "curie '{prefix}' href must contain the {{rel}} variable"
            )));
        }
        if curies.iter().any(|existing| existing.prefix == prefix) {
            return Err(invalid(format!("curie '{prefix}' is declared more than once")));
        }
        curies.push(Curie {
            prefix: prefix.to_string(),
            href: curie.href.clone(),
        });
    }

    Ok(Contract {
        name: contract.to_string(),
        self_link,
        state,
        relations,
        curies,
    })
}

fn resolve_marker(
    member: &MemberDecl,
    adapters: &[Arc<dyn MarkerAdapter>],
) -> Result<Marker, String> {
    let mut resolved = Vec::with_capacity(member.markers.len());
    for marker in &member.markers {
        match marker {
            Marker::Custom(name) => {
                let mapped = adapters
                    .iter()
                    .find_map(|adapter| adapter.resolve(name, member))
                    .filter(|mapped| !matches!(mapped, Marker::Custom(_)))
                    .ok_or_else(|| {
                        format!("accessor '{}' uses unknown marker '{name}'", member.accessor)
                    })?;
                resolved.push(mapped);
            }
            other => resolved.push(other.clone()),
        }
    }
    match resolved.len() {
        0 => Err(format!("accessor '{}' has no marker", member.accessor)),
        1 => Ok(resolved.remove(0)),
        _ => Err(format!(
            "accessor '{}' carries {} conflicting markers",
            member.accessor,
            resolved.len()
        )),
    }
}

fn classify(
    shape: &ReturnShape,
    adapters: &[Arc<dyn ReturnShapeAdapter>],
    depth: usize,
) -> Result<Cardinality, String> {
    match shape {
        ReturnShape::One => Ok(Cardinality::Single),
        ReturnShape::Maybe => Ok(Cardinality::Optional),
        ReturnShape::Many | ReturnShape::Stream => Ok(Cardinality::Many),
        ReturnShape::Future(inner) => match inner.as_ref() {
            ReturnShape::Future(_) => Err("nested futures are not supported".into()),
            inner => classify(inner, adapters, depth),
        },
        ReturnShape::Named(name) => {
            if depth >= MAX_SHAPE_ALIAS_DEPTH {
                return Err(format!("return shape '{name}' does not resolve"));
            }
            let mapped = adapters
                .iter()
                .find_map(|adapter| adapter.resolve(name))
                .ok_or_else(|| format!("unsupported return shape '{name}'"))?;
            classify(&mapped, adapters, depth + 1)
        }
    }
}

fn template_variables(member: &MemberDecl) -> Result<Vec<TemplateVariable>, String> {
    let mut seen = HashSet::new();
    member
        .parameters
        .iter()
        .map(|param: &ParameterDecl| {
            if !param.template_variable {
                return Err(format!(
                    "parameter '{}' of accessor '{}' is not a template variable",
                    param.name, member.accessor
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(format!(
                    "template variable '{}' of accessor '{}' is declared more than once",
                    param.name, member.accessor
                ));
            }
            Ok(TemplateVariable {
                name: param.name.clone(),
                required: param.required,
            })
        })
        .collect()
}
