use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use halyard_protocol::{HalDocument, HalResponse, Link, SELF_REL};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use super::{HalClient, Source};
use crate::context::RequestContext;
use crate::contract::{Cardinality, Contract, RelationMember};
use crate::error::{ClientFetchError, ContractError, HalyardError};
use crate::metrics::UpstreamTiming;
use crate::template::{expand_link, required_variables, Params};

struct Resolved {
    document: HalDocument,
    /// Response metadata without the body; `None` for documents bound inline.
    response: Option<HalResponse>,
    /// Absolute URI the document came from, used as base for its links.
    uri: Option<String>,
}

struct Shared {
    client: HalClient,
    ctx: RequestContext,
    contract: Arc<Contract>,
    link: Option<Link>,
    base: Option<String>,
    resolved: OnceCell<Resolved>,
}

/// A client-side view of one resource, navigated through its contract.
///
/// Cloning shares the resolved document, so a bound resource is fetched at
/// most once no matter how many clones read it.
#[derive(Clone)]
pub struct NavigableResource {
    shared: Arc<Shared>,
}

impl fmt::Debug for NavigableResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigableResource")
            .field("contract", &self.shared.contract.name())
            .field("link", &self.shared.link)
            .field("resolved", &self.shared.resolved.initialized())
            .finish()
    }
}

impl NavigableResource {
    pub(super) fn bind(
        client: HalClient,
        ctx: RequestContext,
        contract: Arc<Contract>,
        source: Source,
        inherited_base: Option<String>,
    ) -> Self {
        let (link, base, resolved) = match source {
            Source::Link(link) => (Some(link), inherited_base, OnceCell::new()),
            Source::Document { document, base } => {
                let base = base.or(inherited_base);
                let link = document.self_link().cloned();
                let uri = link
                    .as_ref()
                    .filter(|link| !link.is_templated())
                    .and_then(|link| absolutize(base.as_deref(), &link.href).ok())
                    .or_else(|| base.clone());
                let resolved = Resolved {
                    document,
                    response: None,
                    uri,
                };
                (link, base, OnceCell::new_with(Some(resolved)))
            }
        };
        Self {
            shared: Arc::new(Shared {
                client,
                ctx,
                contract,
                link,
                base,
                resolved,
            }),
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.shared.contract
    }

    pub fn context(&self) -> &RequestContext {
        &self.shared.ctx
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.resolved.initialized()
    }

    /// The link this resource was bound with. Never performs I/O.
    pub fn self_link(&self) -> Result<Link, HalyardError> {
        self.require_self_member()?;
        self.shared.link.clone().ok_or_else(|| {
            ClientFetchError::invalid_data(
                self.shared.base.clone().unwrap_or_default(),
                format!("{} document has no self link", self.shared.contract.name()),
            )
            .into()
        })
    }

    /// The bound self link with its template expanded.
    pub fn self_link_with(&self, params: &Params) -> Result<Link, HalyardError> {
        let member = self.require_self_member()?;
        for var in member.template_variables.iter().filter(|var| var.required) {
            if !params.contains(&var.name) {
                return Err(ContractError::MissingTemplateVariable {
                    contract: self.shared.contract.name().to_string(),
                    relation: SELF_REL.to_string(),
                    variable: var.name.clone(),
                }
                .into());
            }
        }
        Ok(expand_link(&self.self_link()?, params))
    }

    /// The state payload deserialized as `T`.
    pub async fn state<T: DeserializeOwned>(&self) -> Result<T, HalyardError> {
        let value = self.state_value().await?;
        self.deserialize_state(value)
    }

    /// Like [`state`](Self::state), but `None` when the document carries no
    /// state fields.
    pub async fn optional_state<T: DeserializeOwned>(&self) -> Result<Option<T>, HalyardError> {
        self.require_state_member()?;
        let resolved = self.resolve().await?;
        if !resolved.document.has_state() {
            return Ok(None);
        }
        let value = resolved.document.state_value();
        self.deserialize_state(value).map(Some)
    }

    pub async fn state_value(&self) -> Result<Value, HalyardError> {
        let member = self.require_state_member()?;
        let resolved = self.resolve().await?;
        if member.required && !resolved.document.has_state() {
            return Err(ClientFetchError::invalid_data(
                self.describe_uri(resolved),
                format!("{} document carries no state", self.shared.contract.name()),
            )
            .into());
        }
        Ok(resolved.document.state_value())
    }

    /// Every entry of relation `name`: embedded entries first (already
    /// resolved), then links not duplicating an embedded entry. With
    /// parameters only links are used, expanded with `params`.
    pub async fn relation(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Vec<NavigableResource>, HalyardError> {
        let relation = self.require_relation(name)?;
        self.check_variables(relation, params)?;
        let target = self.shared.client.registry().resolve(&relation.target)?;
        let resolved = self.resolve().await?;
        let base = resolved.uri.clone().or_else(|| self.shared.base.clone());

        let mut entries = Vec::new();
        let mut embedded_hrefs: Vec<&str> = Vec::new();
        if params.is_empty() {
            for doc in resolved.document.embedded(name) {
                if let Some(link) = doc.self_link() {
                    embedded_hrefs.push(link.href.as_str());
                }
                entries.push(self.child(
                    &target,
                    Source::Document {
                        document: doc.clone(),
                        base: None,
                    },
                    base.clone(),
                ));
            }
        }
        for link in resolved.document.links(name) {
            if embedded_hrefs.contains(&link.href.as_str()) {
                continue;
            }
            entries.push(self.child(
                &target,
                Source::Link(expand_link(link, params)),
                base.clone(),
            ));
        }
        Ok(entries)
    }

    pub async fn single(&self, name: &str) -> Result<NavigableResource, HalyardError> {
        self.single_with(name, &Params::new()).await
    }

    /// The one entry of a single-cardinality relation.
    pub async fn single_with(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<NavigableResource, HalyardError> {
        self.expect_cardinality(name, Cardinality::Single)?;
        let entries = self.relation(name, params).await?;
        match entries.into_iter().next() {
            Some(entry) => Ok(entry),
            None => {
                let resolved = self.resolve().await?;
                Err(ClientFetchError::invalid_data(
                    self.describe_uri(resolved),
                    format!(
                        "required relation '{name}' of {} is missing",
                        self.shared.contract.name()
                    ),
                )
                .into())
            }
        }
    }

    pub async fn optional(&self, name: &str) -> Result<Option<NavigableResource>, HalyardError> {
        self.optional_with(name, &Params::new()).await
    }

    pub async fn optional_with(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Option<NavigableResource>, HalyardError> {
        self.expect_cardinality(name, Cardinality::Optional)?;
        Ok(self.relation(name, params).await?.into_iter().next())
    }

    pub async fn many(&self, name: &str) -> Result<Vec<NavigableResource>, HalyardError> {
        self.many_with(name, &Params::new()).await
    }

    pub async fn many_with(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<Vec<NavigableResource>, HalyardError> {
        self.expect_cardinality(name, Cardinality::Many)?;
        self.relation(name, params).await
    }

    /// The resolved raw document.
    pub async fn document(&self) -> Result<&HalDocument, HalyardError> {
        Ok(&self.resolve().await?.document)
    }

    /// Metadata of the upstream response; `None` for inline documents.
    pub async fn response(&self) -> Result<Option<&HalResponse>, HalyardError> {
        Ok(self.resolve().await?.response.as_ref())
    }

    fn child(&self, target: &Arc<Contract>, source: Source, base: Option<String>) -> Self {
        Self::bind(
            self.shared.client.clone(),
            self.shared.ctx.clone(),
            Arc::clone(target),
            source,
            base,
        )
    }

    fn require_self_member(&self) -> Result<&crate::contract::SelfLinkMember, ContractError> {
        self.shared
            .contract
            .self_link()
            .ok_or_else(|| ContractError::MissingMember {
                contract: self.shared.contract.name().to_string(),
                member: "self link",
            })
    }

    fn require_state_member(&self) -> Result<&crate::contract::StateMember, ContractError> {
        self.shared
            .contract
            .state()
            .ok_or_else(|| ContractError::MissingMember {
                contract: self.shared.contract.name().to_string(),
                member: "state",
            })
    }

    fn require_relation(&self, name: &str) -> Result<&RelationMember, ContractError> {
        self.shared
            .contract
            .relation(name)
            .ok_or_else(|| ContractError::UnknownRelation {
                contract: self.shared.contract.name().to_string(),
                relation: name.to_string(),
            })
    }

    fn expect_cardinality(&self, name: &str, requested: Cardinality) -> Result<(), ContractError> {
        let relation = self.require_relation(name)?;
        if relation.cardinality != requested {
            return Err(ContractError::CardinalityMismatch {
                contract: self.shared.contract.name().to_string(),
                relation: name.to_string(),
                declared: relation.cardinality,
                requested,
            });
        }
        Ok(())
    }

    fn check_variables(&self, relation: &RelationMember, params: &Params) -> Result<(), ContractError> {
        match relation.required_variables().find(|var| !params.contains(var)) {
            Some(missing) => Err(ContractError::MissingTemplateVariable {
                contract: self.shared.contract.name().to_string(),
                relation: relation.name.clone(),
                variable: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn deserialize_state<T: DeserializeOwned>(&self, value: Value) -> Result<T, HalyardError> {
        serde_json::from_value(value).map_err(|err| {
            let uri = self
                .shared
                .resolved
                .get()
                .map(|resolved| self.describe_uri(resolved))
                .unwrap_or_default();
            ClientFetchError::invalid_data(
                uri,
                format!(
                    "state does not match {}: {err}",
                    self.shared.contract.name()
                ),
            )
            .into()
        })
    }

    fn describe_uri(&self, resolved: &Resolved) -> String {
        resolved
            .uri
            .clone()
            .or_else(|| self.shared.link.as_ref().map(|link| link.href.clone()))
            .unwrap_or_default()
    }

    async fn resolve(&self) -> Result<&Resolved, HalyardError> {
        self.shared.resolved.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> Result<Resolved, HalyardError> {
        let link = self.shared.link.as_ref().ok_or_else(|| {
            ClientFetchError::invalid_data(
                self.shared.base.clone().unwrap_or_default(),
                format!("{} resource has no link to fetch", self.shared.contract.name()),
            )
        })?;
        if link.is_templated() {
            if let Some(variable) = required_variables(&link.href).into_iter().next() {
                return Err(ContractError::MissingTemplateVariable {
                    contract: self.shared.contract.name().to_string(),
                    relation: SELF_REL.to_string(),
                    variable,
                }
                .into());
            }
        }
        let link = expand_link(link, &Params::new());
        let uri = absolutize(self.shared.base.as_deref(), &link.href)?;

        let metrics = self.shared.ctx.metrics();
        let started = Instant::now();
        let outcome = self.shared.client.loader().get(&uri).await;
        let duration = started.elapsed();

        let mut response = match outcome {
            Ok(response) => response,
            Err(err) => {
                metrics.record_upstream(UpstreamTiming {
                    uri: uri.clone(),
                    title: link.title.clone(),
                    max_age: None,
                    duration,
                });
                return Err(err.into());
            }
        };
        metrics.record_upstream(UpstreamTiming {
            uri: uri.clone(),
            title: response
                .title()
                .map(str::to_string)
                .or_else(|| link.title.clone()),
            max_age: response.max_age,
            duration,
        });
        tracing::debug!(
            contract = self.shared.contract.name(),
            %uri,
            status = response.status,
            max_age = ?response.max_age,
            "resolved resource"
        );

        let document = response.body.take().ok_or_else(|| {
            ClientFetchError::invalid_data(uri.clone(), "upstream response has no body")
        })?;
        Ok(Resolved {
            document,
            response: Some(response),
            uri: Some(uri),
        })
    }
}

/// Resolves `href` against `base`; absolute hrefs and a missing base leave it
/// unchanged.
fn absolutize(base: Option<&str>, href: &str) -> Result<String, ClientFetchError> {
    if Url::parse(href).is_ok() {
        return Ok(href.to_string());
    }
    let Some(base) = base else {
        return Ok(href.to_string());
    };
    let base_url = Url::parse(base)
        .map_err(|err| ClientFetchError::invalid_data(base, format!("invalid base uri: {err}")))?;
    base_url
        .join(href)
        .map(String::from)
        .map_err(|err| ClientFetchError::invalid_data(href, format!("invalid link: {err}")))
}
