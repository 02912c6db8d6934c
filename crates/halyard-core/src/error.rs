use halyard_protocol::HalResponse;

use crate::contract::Cardinality;

/// Every failure surfaced by rendering, navigation or fetching.
#[derive(Debug, thiserror::Error)]
pub enum HalyardError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    ClientFetch(#[from] ClientFetchError),
    #[error(transparent)]
    ServerLogic(#[from] ServerLogicError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HalyardError {
    pub fn other(message: impl std::fmt::Display) -> Self {
        HalyardError::Other(anyhow::anyhow!("{message}"))
    }

    pub fn as_contract(&self) -> Option<&ContractError> {
        match self {
            HalyardError::Contract(err) => Some(err),
            HalyardError::Other(err) => err.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_client_fetch(&self) -> Option<&ClientFetchError> {
        match self {
            HalyardError::ClientFetch(err) => Some(err),
            HalyardError::Other(err) => err.chain().find_map(|cause| cause.downcast_ref()),
            _ => None,
        }
    }

    pub fn as_server_logic(&self) -> Option<&ServerLogicError> {
        match self {
            HalyardError::ServerLogic(err) => Some(err),
            HalyardError::Other(err) => err.chain().find_map(|cause| cause.downcast_ref()),
            _ => None,
        }
    }
}

/// A resource implementation or declaration violates its contract. These are
/// programming defects: never retried, reported as 500 by default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("invalid contract {contract}: {detail}")]
    InvalidDeclaration { contract: String, detail: String },
    #[error("unknown contract '{0}'")]
    UnknownContract(String),
    #[error("{contract} has no relation named '{relation}'")]
    UnknownRelation { contract: String, relation: String },
    #[error("{contract} does not declare a {member} member")]
    MissingMember {
        contract: String,
        member: &'static str,
    },
    #[error("{contract} resource did not provide a self link")]
    MissingSelfLink { contract: String },
    #[error("{contract} resource did not provide its required state")]
    MissingState { contract: String },
    #[error("{contract} resource emitted state that is not a JSON object")]
    InvalidState { contract: String },
    #[error("relation '{relation}' of {contract} is {expected} but {actual} item(s) were emitted")]
    Cardinality {
        contract: String,
        relation: String,
        expected: Cardinality,
        actual: usize,
    },
    #[error("relation '{relation}' of {contract} is declared {declared}, not {requested}")]
    CardinalityMismatch {
        contract: String,
        relation: String,
        declared: Cardinality,
        requested: Cardinality,
    },
    #[error("missing template variable '{variable}' for relation '{relation}' of {contract}")]
    MissingTemplateVariable {
        contract: String,
        relation: String,
        variable: String,
    },
}

impl ContractError {
    pub fn invalid(contract: impl Into<String>, detail: impl Into<String>) -> Self {
        ContractError::InvalidDeclaration {
            contract: contract.into(),
            detail: detail.into(),
        }
    }
}

/// An upstream HTTP or network failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (uri: {uri}{})", status_suffix(*.status))]
pub struct ClientFetchError {
    pub uri: String,
    /// HTTP status of the failed response; `None` for network level failures.
    pub status: Option<u16>,
    pub message: String,
    /// The upstream response, when one was received.
    pub response: Option<Box<HalResponse>>,
}

fn status_suffix(status: Option<u16>) -> String {
    match status {
        Some(code) => format!(", status: {code}"),
        None => String::new(),
    }
}

impl ClientFetchError {
    pub fn network(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            status: None,
            message: message.into(),
            response: None,
        }
    }

    pub fn from_response(response: HalResponse, message: impl Into<String>) -> Self {
        Self {
            uri: response.uri.clone(),
            status: Some(response.status),
            message: message.into(),
            response: Some(Box::new(response)),
        }
    }

    /// Upstream data was structurally unusable (missing entries, bad state).
    pub fn invalid_data(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::network(uri, message)
    }

    /// The error document the upstream service returned, if any.
    pub fn error_document(&self) -> Option<&halyard_protocol::HalDocument> {
        self.response.as_ref().and_then(|resp| resp.body.as_ref())
    }
}

/// Raised deliberately by a resource implementation to force a status code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ServerLogicError {
    pub status: u16,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ServerLogicError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn client_fetch_display_includes_status() {
        let response = HalResponse::new("http://up/x", 404, Utc::now());
        let err = ClientFetchError::from_response(response, "upstream request failed");
        assert_eq!(
            err.to_string(),
            "upstream request failed (uri: http://up/x, status: 404)"
        );
        let net = ClientFetchError::network("http://up/y", "connection refused");
        assert_eq!(net.to_string(), "connection refused (uri: http://up/y)");
    }

    #[test]
    fn classification_sees_through_anyhow_context() {
        let err: HalyardError = anyhow::Error::new(ServerLogicError::not_found("gone"))
            .context("loading item")
            .into();
        assert_eq!(err.as_server_logic().map(|e| e.status), Some(404));
        assert!(err.as_client_fetch().is_none());
    }
}
