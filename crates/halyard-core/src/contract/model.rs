use std::fmt;

use serde::Serialize;

use super::decl::ContractRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Optional,
    Many,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::Optional => "optional",
            Cardinality::Many => "many",
        }
    }

    /// Whether `count` emitted items satisfy this cardinality.
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Cardinality::Single => count == 1,
            Cardinality::Optional => count <= 1,
            Cardinality::Many => true,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How targets of a relation appear in a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedPolicy {
    /// Only a link built from the target's self link.
    #[default]
    Link,
    /// The fully rendered target under `_embedded`.
    Embed,
    /// Both of the above.
    LinkAndEmbed,
}

impl EmbedPolicy {
    pub fn links(&self) -> bool {
        matches!(self, EmbedPolicy::Link | EmbedPolicy::LinkAndEmbed)
    }

    pub fn embeds(&self) -> bool {
        matches!(self, EmbedPolicy::Embed | EmbedPolicy::LinkAndEmbed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateVariable {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfLinkMember {
    pub accessor: String,
    pub required: bool,
    pub template_variables: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateMember {
    pub accessor: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationMember {
    pub accessor: String,
    pub name: String,
    pub cardinality: Cardinality,
    pub embed: EmbedPolicy,
    #[serde(serialize_with = "serialize_target")]
    pub target: ContractRef,
    pub template_variables: Vec<TemplateVariable>,
}

fn serialize_target<S: serde::Serializer>(target: &ContractRef, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(target.name())
}

impl RelationMember {
    pub fn required_variables(&self) -> impl Iterator<Item = &str> {
        self.template_variables
            .iter()
            .filter(|var| var.required)
            .map(|var| var.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Curie {
    pub prefix: String,
    pub href: String,
}

/// A validated, immutable resource contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub(crate) name: String,
    pub(crate) self_link: Option<SelfLinkMember>,
    pub(crate) state: Option<StateMember>,
    pub(crate) relations: Vec<RelationMember>,
    pub(crate) curies: Vec<Curie>,
}

impl Contract {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn self_link(&self) -> Option<&SelfLinkMember> {
        self.self_link.as_ref()
    }

    pub fn state(&self) -> Option<&StateMember> {
        self.state.as_ref()
    }

    pub fn relations(&self) -> &[RelationMember] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationMember> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    pub fn curies(&self) -> &[Curie] {
        &self.curies
    }

    /// The curie whose prefix matches a `prefix:rel` relation name.
    pub fn curie_for(&self, relation: &str) -> Option<&Curie> {
        let (prefix, _) = relation.split_once(':')?;
        self.curies.iter().find(|curie| curie.prefix == prefix)
    }
}
