use std::sync::Arc;

use futures_util::future::{try_join, try_join_all, BoxFuture};
use futures_util::FutureExt;
use halyard_protocol::{HalDocument, Link, CURIES_REL};
use serde_json::Value;

use crate::context::RequestContext;
use crate::contract::{Cardinality, Contract, ContractRegistry, RelationMember, ResourceContract};
use crate::error::{ContractError, HalyardError};
use crate::resource::ResourceHandle;

/// Renders server-side resources into HAL documents.
#[derive(Clone)]
pub struct Renderer {
    registry: Arc<ContractRegistry>,
}

struct RenderedEntry {
    link: Option<Link>,
    embedded: Option<HalDocument>,
}

struct RenderedRelation {
    name: String,
    cardinality: Cardinality,
    entries: Vec<RenderedEntry>,
}

impl Renderer {
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    /// Renders `resource` as `contract`, including every relation branch.
    ///
    /// Branches run concurrently; the first failure aborts the render and no
    /// partial document is returned.
    pub async fn render(
        &self,
        ctx: &RequestContext,
        resource: ResourceHandle,
        contract: &Arc<Contract>,
    ) -> Result<HalDocument, HalyardError> {
        render_node(
            Arc::clone(&self.registry),
            ctx.clone(),
            resource,
            Arc::clone(contract),
        )
        .await
    }

    pub async fn render_as<C: ResourceContract>(
        &self,
        ctx: &RequestContext,
        resource: ResourceHandle,
    ) -> Result<HalDocument, HalyardError> {
        let contract = self.registry.contract::<C>()?;
        self.render(ctx, resource, &contract).await
    }
}

fn render_node(
    registry: Arc<ContractRegistry>,
    ctx: RequestContext,
    resource: ResourceHandle,
    contract: Arc<Contract>,
) -> BoxFuture<'static, Result<HalDocument, HalyardError>> {
    async move {
        let metrics = Arc::clone(ctx.metrics());
        let _watch = metrics.stopwatch(format!("render {}", contract.name()));

        let self_link = match contract.self_link() {
            Some(member) => match resource.self_link()? {
                Some(link) => Some(link),
                None if member.required => {
                    return Err(ContractError::MissingSelfLink {
                        contract: contract.name().to_string(),
                    }
                    .into())
                }
                None => None,
            },
            None => None,
        };

        let state = render_state(&resource, &contract);
        let relations = try_join_all(contract.relations().iter().map(|rel| {
            render_relation(
                Arc::clone(&registry),
                ctx.clone(),
                Arc::clone(&resource),
                contract.name().to_string(),
                rel.clone(),
            )
        }));
        let (state, relations) = try_join(state, relations).await?;

        let mut doc = match state {
            Some(Value::Object(map)) => HalDocument {
                state: map,
                ..HalDocument::default()
            },
            Some(_) => {
                return Err(ContractError::InvalidState {
                    contract: contract.name().to_string(),
                }
                .into())
            }
            None => HalDocument::new(),
        };
        if let Some(link) = self_link {
            doc.set_self_link(link);
        }
        for relation in relations {
            attach(&mut doc, &contract, relation);
        }
        tracing::trace!(contract = contract.name(), "rendered resource");
        Ok(doc)
    }
    .boxed()
}

async fn render_state(
    resource: &ResourceHandle,
    contract: &Contract,
) -> Result<Option<Value>, HalyardError> {
    let Some(member) = contract.state() else {
        return Ok(None);
    };
    let mut values = resource.state().collect().await?;
    match values.len() {
        0 if member.required => Err(ContractError::MissingState {
            contract: contract.name().to_string(),
        }
        .into()),
        0 => Ok(None),
        1 => Ok(values.pop()),
        actual => Err(ContractError::Cardinality {
            contract: contract.name().to_string(),
            relation: member.accessor.clone(),
            expected: Cardinality::Single,
            actual,
        }
        .into()),
    }
}

async fn render_relation(
    registry: Arc<ContractRegistry>,
    ctx: RequestContext,
    resource: ResourceHandle,
    contract: String,
    relation: RelationMember,
) -> Result<RenderedRelation, HalyardError> {
    let items = resource.relation(&relation.name).collect().await?;
    if !relation.cardinality.accepts(items.len()) {
        return Err(ContractError::Cardinality {
            contract,
            relation: relation.name,
            expected: relation.cardinality,
            actual: items.len(),
        }
        .into());
    }
    let target = registry.resolve(&relation.target)?;
    let entries = try_join_all(items.into_iter().map(|item| {
        render_entry(
            Arc::clone(&registry),
            ctx.clone(),
            item,
            Arc::clone(&target),
            relation.embed.links(),
            relation.embed.embeds(),
        )
    }))
    .await?;
    Ok(RenderedRelation {
        name: relation.name,
        cardinality: relation.cardinality,
        entries,
    })
}

async fn render_entry(
    registry: Arc<ContractRegistry>,
    ctx: RequestContext,
    item: ResourceHandle,
    target: Arc<Contract>,
    link: bool,
    embed: bool,
) -> Result<RenderedEntry, HalyardError> {
    if embed {
        let doc = render_node(registry, ctx, item, target).await?;
        let link = if link { doc.self_link().cloned() } else { None };
        return Ok(RenderedEntry {
            link,
            embedded: Some(doc),
        });
    }
    if target.self_link().is_none() {
        return Err(ContractError::MissingMember {
            contract: target.name().to_string(),
            member: "self link",
        }
        .into());
    }
    match item.self_link()? {
        Some(link) => Ok(RenderedEntry {
            link: Some(link),
            embedded: None,
        }),
        None => Err(ContractError::MissingSelfLink {
            contract: target.name().to_string(),
        }
        .into()),
    }
}

fn attach(doc: &mut HalDocument, contract: &Contract, relation: RenderedRelation) {
    if relation.entries.is_empty() {
        return;
    }
    if let Some(curie) = contract.curie_for(&relation.name) {
        let present = doc
            .curies()
            .iter()
            .any(|link| link.name.as_deref() == Some(curie.prefix.as_str()));
        if !present {
            doc.push_link(
                CURIES_REL,
                Link::new(curie.href.clone()).with_name(curie.prefix.clone()),
            );
        }
    }
    let many = relation.cardinality == Cardinality::Many;
    for entry in relation.entries {
        match (entry.link, many) {
            (Some(link), true) => doc.push_link(relation.name.clone(), link),
            (Some(link), false) => doc.set_link(relation.name.clone(), link),
            (None, _) => {}
        }
        match (entry.embedded, many) {
            (Some(embedded), true) => doc.push_embedded(relation.name.clone(), embedded),
            (Some(embedded), false) => doc.set_embedded(relation.name.clone(), embedded),
            (None, _) => {}
        }
    }
}
