use serde::{Deserialize, Serialize};

/// A HAL link object. `href` is either a literal URI or an RFC 6570 template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub templated: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Link {
    /// Creates a link; the templated flag is derived from the presence of a
    /// template expression in `href`.
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        let templated = looks_templated(&href);
        Self {
            href,
            name: None,
            title: None,
            media_type: None,
            templated,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Replaces the href, keeping name/title/type and recomputing `templated`.
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self.templated = looks_templated(&self.href);
        self
    }

    pub fn is_templated(&self) -> bool {
        self.templated || looks_templated(&self.href)
    }
}

fn looks_templated(href: &str) -> bool {
    match href.find('{') {
        Some(open) => href[open..].contains('}'),
        None => false,
    }
}

impl From<&str> for Link {
    fn from(href: &str) -> Self {
        Link::new(href)
    }
}

impl From<String> for Link {
    fn from(href: String) -> Self {
        Link::new(href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn templated_flag_follows_href() {
        assert!(!Link::new("/items/1").templated);
        assert!(Link::new("/items/{id}").templated);
        assert!(Link::new("/items{?page,size}").templated);
        assert!(!Link::new("/weird{").templated);
    }

    #[test]
    fn serializes_only_present_members() {
        let link = Link::new("/items/{id}").with_title("Item");
        let value = serde_json::to_value(&link).unwrap();
        assert_eq!(
            value,
            json!({"href": "/items/{id}", "title": "Item", "templated": true})
        );

        let plain = serde_json::to_value(Link::new("/x").with_media_type("text/html")).unwrap();
        assert_eq!(plain, json!({"href": "/x", "type": "text/html"}));
    }

    #[test]
    fn deserializes_missing_flags_as_defaults() {
        let link: Link = serde_json::from_value(json!({"href": "/a", "name": "a"})).unwrap();
        assert_eq!(link.href, "/a");
        assert_eq!(link.name.as_deref(), Some("a"));
        assert!(!link.templated);
    }
}
