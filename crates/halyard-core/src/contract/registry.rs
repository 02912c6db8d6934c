use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::decl::{ContractDecl, ContractRef, ResourceContract};
use super::introspect::{introspect, MarkerAdapter, ReturnShapeAdapter};
use super::model::Contract;
use crate::error::ContractError;

/// Validated contracts, cached by type and by name.
///
/// Constructed once at startup and shared by reference; contracts are
/// introspected on first use and never re-validated.
#[derive(Default)]
pub struct ContractRegistry {
    by_type: RwLock<HashMap<TypeId, Arc<Contract>>>,
    by_name: RwLock<HashMap<String, Arc<Contract>>>,
    marker_adapters: Vec<Arc<dyn MarkerAdapter>>,
    shape_adapters: Vec<Arc<dyn ReturnShapeAdapter>>,
}

#[derive(Default)]
pub struct ContractRegistryBuilder {
    marker_adapters: Vec<Arc<dyn MarkerAdapter>>,
    shape_adapters: Vec<Arc<dyn ReturnShapeAdapter>>,
}

impl ContractRegistryBuilder {
    pub fn marker_adapter(mut self, adapter: impl MarkerAdapter + 'static) -> Self {
        self.marker_adapters.push(Arc::new(adapter));
        self
    }

    pub fn shape_adapter(mut self, adapter: impl ReturnShapeAdapter + 'static) -> Self {
        self.shape_adapters.push(Arc::new(adapter));
        self
    }

    pub fn build(self) -> ContractRegistry {
        ContractRegistry {
            marker_adapters: self.marker_adapters,
            shape_adapters: self.shape_adapters,
            ..ContractRegistry::default()
        }
    }
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::default()
    }

    /// The validated contract of `C`, introspected on first call.
    pub fn contract<C: ResourceContract>(&self) -> Result<Arc<Contract>, ContractError> {
        self.resolve(&ContractRef::of::<C>())
    }

    /// Resolves a relation target or any other contract reference.
    pub fn resolve(&self, reference: &ContractRef) -> Result<Arc<Contract>, ContractError> {
        if let Some(type_id) = reference.type_id() {
            if let Some(found) = self.by_type.read().get(&type_id) {
                return Ok(Arc::clone(found));
            }
            let decl = reference
                .declaration()
                .ok_or_else(|| ContractError::UnknownContract(reference.name().to_string()))?;
            let contract = self.validate(&decl)?;
            let mut by_type = self.by_type.write();
            // another caller may have won the race; keep the first descriptor
            let entry = by_type.entry(type_id).or_insert_with(|| Arc::clone(&contract));
            let entry = Arc::clone(entry);
            drop(by_type);
            self.by_name
                .write()
                .entry(entry.name().to_string())
                .or_insert_with(|| Arc::clone(&entry));
            tracing::debug!(contract = entry.name(), "registered contract");
            return Ok(entry);
        }
        self.by_name
            .read()
            .get(reference.name())
            .cloned()
            .ok_or_else(|| ContractError::UnknownContract(reference.name().to_string()))
    }

    /// Registers an untyped declaration, addressable with [`ContractRef::named`].
    pub fn register(&self, decl: ContractDecl) -> Result<Arc<Contract>, ContractError> {
        let contract = self.validate(&decl)?;
        let mut by_name = self.by_name.write();
        if let Some(existing) = by_name.get(contract.name()) {
            if existing.as_ref() != contract.as_ref() {
                return Err(ContractError::invalid(
                    contract.name(),
                    "a different contract with this name is already registered",
                ));
            }
            return Ok(Arc::clone(existing));
        }
        by_name.insert(contract.name().to_string(), Arc::clone(&contract));
        Ok(contract)
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Contract>> {
        self.by_name.read().get(name).cloned()
    }

    /// Resolves `root` and, transitively, every relation target, so that a
    /// broken declaration anywhere in the graph fails at startup.
    pub fn validate_graph(&self, root: &ContractRef) -> Result<Vec<Arc<Contract>>, ContractError> {
        let mut visited: Vec<Arc<Contract>> = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(next) = pending.pop() {
            let contract = self.resolve(&next)?;
            if visited.iter().any(|seen| seen.name() == contract.name()) {
                continue;
            }
            pending.extend(contract.relations().iter().map(|rel| rel.target.clone()));
            visited.push(contract);
        }
        Ok(visited)
    }

    pub fn len(&self) -> usize {
        self.by_name.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self, decl: &ContractDecl) -> Result<Arc<Contract>, ContractError> {
        introspect(decl, &self.marker_adapters, &self.shape_adapters).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MemberDecl, ReturnShape};

    struct Node;

    impl ResourceContract for Node {
        const NAME: &'static str = "Node";

        fn declare() -> ContractDecl {
            ContractDecl::new(Self::NAME)
                .member(MemberDecl::self_link("link", ReturnShape::One))
                .member(MemberDecl::relation(
                    "children",
                    "child",
                    ContractRef::of::<Node>(),
                    ReturnShape::Many,
                ))
                .member(MemberDecl::relation(
                    "leaf",
                    "leaf",
                    ContractRef::of::<Leaf>(),
                    ReturnShape::Maybe,
                ))
        }
    }

    struct Leaf;

    impl ResourceContract for Leaf {
        const NAME: &'static str = "Leaf";

        fn declare() -> ContractDecl {
            ContractDecl::new(Self::NAME).member(MemberDecl::state("value", ReturnShape::One))
        }
    }

    struct Broken;

    impl ResourceContract for Broken {
        const NAME: &'static str = "Broken";

        fn declare() -> ContractDecl {
            ContractDecl::new(Self::NAME).member(MemberDecl::relation(
                "oops",
                "oops",
                ContractRef::named("Nowhere"),
                ReturnShape::One,
            ))
        }
    }

    #[test]
    fn caches_contracts_by_type() {
        let registry = ContractRegistry::new();
        let first = registry.contract::<Node>().unwrap();
        let second = registry.contract::<Node>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.by_name("Node").is_some());
    }

    #[test]
    fn validates_recursive_graph() {
        let registry = ContractRegistry::new();
        let graph = registry.validate_graph(&ContractRef::of::<Node>()).unwrap();
        let mut names: Vec<_> = graph.iter().map(|c| c.name().to_string()).collect();
        names.sort();
        assert_eq!(names, ["Leaf", "Node"]);
    }

    #[test]
    fn unknown_named_target_fails_graph_validation() {
        let registry = ContractRegistry::new();
        let err = registry
            .validate_graph(&ContractRef::of::<Broken>())
            .unwrap_err();
        assert_eq!(err, ContractError::UnknownContract("Nowhere".into()));
    }

    #[test]
    fn register_rejects_conflicting_redefinition() {
        let registry = ContractRegistry::new();
        registry
            .register(ContractDecl::new("Dyn").member(MemberDecl::state("s", ReturnShape::One)))
            .unwrap();
        registry
            .register(ContractDecl::new("Dyn").member(MemberDecl::state("s", ReturnShape::One)))
            .expect("identical redefinition is accepted");
        let err = registry
            .register(ContractDecl::new("Dyn").member(MemberDecl::state("s", ReturnShape::Maybe)))
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidDeclaration { .. }));
        assert!(registry.resolve(&ContractRef::named("Dyn")).is_ok());
    }
}
