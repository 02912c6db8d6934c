//! Wire model for HAL documents exchanged between halyard servers and clients.

mod document;
mod link;
mod response;

pub use document::{HalDocument, Relation};
pub use link::Link;
pub use response::HalResponse;

/// Media type of regular resource documents.
pub const HAL_JSON: &str = "application/hal+json";

/// Media type of error documents.
pub const VND_ERROR_JSON: &str = "application/vnd.error+json";

pub const SELF_REL: &str = "self";
pub const CURIES_REL: &str = "curies";
pub const ABOUT_REL: &str = "about";
pub const ERRORS_REL: &str = "errors";
pub const VIA_REL: &str = "via";
pub const DIAGNOSTICS_REL: &str = "diagnostics";

/// Reserved top-level keys that never belong to the state of a document.
pub const LINKS_KEY: &str = "_links";
pub const EMBEDDED_KEY: &str = "_embedded";
