//! RFC 6570 URI template expansion (levels 1 to 4, without prefix modifiers
//! on composite values).

use std::collections::BTreeMap;

use halyard_protocol::Link;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Like [`UNRESERVED`] but reserved characters and `%` pass through, for the
/// `+` and `#` operators.
const RESERVED: &AsciiSet = &UNRESERVED
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'%');

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    String(String),
    List(Vec<String>),
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::String(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::String(value)
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(values: Vec<String>) -> Self {
        TemplateValue::List(values)
    }
}

impl From<Vec<&str>> for TemplateValue {
    fn from(values: Vec<&str>) -> Self {
        TemplateValue::List(values.into_iter().map(str::to_string).collect())
    }
}

macro_rules! template_value_from_display {
    ($($ty:ty),*) => {
        $(impl From<$ty> for TemplateValue {
            fn from(value: $ty) -> Self {
                TemplateValue::String(value.to_string())
            }
        })*
    };
}

template_value_from_display!(i32, i64, u32, u64, usize, bool);

/// Template variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, TemplateValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<TemplateValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

struct Operator {
    first: &'static str,
    sep: &'static str,
    named: bool,
    if_empty: &'static str,
    reserved: bool,
}

fn operator(op: Option<char>) -> Operator {
    let (first, sep, named, if_empty, reserved) = match op {
        Some('+') => ("", ",", false, "", true),
        Some('#') => ("#", ",", false, "", true),
        Some('.') => (".", ".", false, "", false),
        Some('/') => ("/", "/", false, "", false),
        Some(';') => (";", ";", true, "", false),
        Some('?') => ("?", "&", true, "=", false),
        Some('&') => ("&", "&", true, "=", false),
        _ => ("", ",", false, "", false),
    };
    Operator {
        first,
        sep,
        named,
        if_empty,
        reserved,
    }
}

struct VarSpec<'a> {
    name: &'a str,
    prefix: Option<usize>,
    explode: bool,
}

fn parse_expression(expr: &str) -> (Option<char>, Vec<VarSpec<'_>>) {
    let op = expr
        .chars()
        .next()
        .filter(|c| matches!(c, '+' | '#' | '.' | '/' | ';' | '?' | '&'));
    let list = match op {
        Some(c) => &expr[c.len_utf8()..],
        None => expr,
    };
    let specs = list
        .split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| {
            if let Some(name) = spec.strip_suffix('*') {
                VarSpec {
                    name,
                    prefix: None,
                    explode: true,
                }
            } else if let Some((name, len)) = spec.split_once(':') {
                VarSpec {
                    name,
                    prefix: len.parse().ok(),
                    explode: false,
                }
            } else {
                VarSpec {
                    name: spec,
                    prefix: None,
                    explode: false,
                }
            }
        })
        .collect();
    (op, specs)
}

/// Variables outside query expressions (`{?..}` and `{&..}`), in order of
/// appearance. Leaving one of these unbound truncates the path.
pub fn required_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for expr in expressions(template) {
        let (op, specs) = parse_expression(expr);
        if matches!(op, Some('?' | '&')) {
            continue;
        }
        for spec in specs {
            if !names.iter().any(|known| known == spec.name) {
                names.push(spec.name.to_string());
            }
        }
    }
    names
}

fn expressions(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || {
        let open = rest.find('{')?;
        let close = rest[open..].find('}')? + open;
        let expr = &rest[open + 1..close];
        rest = &rest[close + 1..];
        Some(expr)
    })
}

/// Expands `template`; unbound variables expand to nothing.
pub fn expand(template: &str, params: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|idx| idx + open) else {
            break;
        };
        out.push_str(&rest[..open]);
        expand_expression(&rest[open + 1..close], params, &mut out);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand_expression(expr: &str, params: &Params, out: &mut String) {
    let (op, specs) = parse_expression(expr);
    let op = operator(op);
    let encode = |value: &str| -> String {
        let set = if op.reserved { RESERVED } else { UNRESERVED };
        utf8_percent_encode(value, set).to_string()
    };

    let mut first = true;
    for spec in specs {
        let Some(value) = params.get(spec.name) else {
            continue;
        };
        let rendered = match value {
            TemplateValue::String(raw) => {
                let raw = match spec.prefix {
                    Some(len) => raw.chars().take(len).collect::<String>(),
                    None => raw.clone(),
                };
                if op.named {
                    if raw.is_empty() {
                        format!("{}{}", spec.name, op.if_empty)
                    } else {
                        format!("{}={}", spec.name, encode(&raw))
                    }
                } else {
                    encode(&raw)
                }
            }
            TemplateValue::List(items) => {
                if items.is_empty() {
                    continue;
                }
                if spec.explode {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|item| {
                            if op.named {
                                format!("{}={}", spec.name, encode(item))
                            } else {
                                encode(item)
                            }
                        })
                        .collect();
                    parts.join(op.sep)
                } else {
                    let joined = items
                        .iter()
                        .map(|item| encode(item))
                        .collect::<Vec<_>>()
                        .join(",");
                    if op.named {
                        format!("{}={}", spec.name, joined)
                    } else {
                        joined
                    }
                }
            }
        };
        out.push_str(if first { op.first } else { op.sep });
        out.push_str(&rendered);
        first = false;
    }
}

/// Expands a link's href, keeping its name, title and type.
pub fn expand_link(link: &Link, params: &Params) -> Link {
    if !link.is_templated() {
        return link.clone();
    }
    link.clone().with_href(expand(&link.href, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params::new()
            .with("var", "value")
            .with("hello", "Hello World!")
            .with("path", "/foo/bar")
            .with("empty", "")
            .with("list", vec!["red", "green", "blue"])
            .with("x", 1024)
            .with("y", 768)
    }

    #[test]
    fn expands_rfc6570_cases() {
        let p = params();
        let cases = [
            ("{var}", "value"),
            ("{hello}", "Hello%20World%21"),
            ("{+hello}", "Hello%20World!"),
            ("{+path}/here", "/foo/bar/here"),
            ("X{#var}", "X#value"),
            ("map?{x,y}", "map?1024,768"),
            ("X{.var}", "X.value"),
            ("{/var,x}/here", "/value/1024/here"),
            ("{;x,y,empty}", ";x=1024;y=768;empty"),
            ("{?x,y,empty}", "?x=1024&y=768&empty="),
            ("?fixed=yes{&x}", "?fixed=yes&x=1024"),
            ("{var:3}", "val"),
            ("{list}", "red,green,blue"),
            ("{/list*}", "/red/green/blue"),
            ("{?list*}", "?list=red&list=green&list=blue"),
        ];
        for (template, expected) in cases {
            assert_eq!(expand(template, &p), expected, "template {template}");
        }
    }

    #[test]
    fn unbound_variables_expand_to_nothing() {
        let p = Params::new().with("id", 7);
        assert_eq!(expand("/items/{id}{?page,size}", &p), "/items/7");
        assert_eq!(expand("/items{?page}", &Params::new()), "/items");
        assert_eq!(expand("/plain", &p), "/plain");
        assert_eq!(expand("/broken{id", &p), "/broken{id");
    }

    #[test]
    fn query_variables_are_optional() {
        assert_eq!(required_variables("/a/{id}/b/{id}{?q,page}{&q}"), ["id"]);
        assert_eq!(required_variables("/{+path}{/list*}{x:2}"), ["path", "list", "x"]);
        assert!(required_variables("/items{?page,size}").is_empty());
        assert!(required_variables("/plain").is_empty());
    }

    #[test]
    fn expand_link_keeps_metadata() {
        let link = Link::new("/items/{id}").with_title("Item");
        let expanded = expand_link(&link, &Params::new().with("id", "a b"));
        assert_eq!(expanded.href, "/items/a%20b");
        assert_eq!(expanded.title.as_deref(), Some("Item"));
        assert!(!expanded.templated);
    }
}
