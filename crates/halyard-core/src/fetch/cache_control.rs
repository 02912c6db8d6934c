//! `Cache-Control` handling.

/// Seconds an `immutable` response is considered fresh.
pub const IMMUTABLE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// Extracts the freshness lifetime from a `Cache-Control` value.
///
/// Directive names are case-insensitive; unrelated directives, empty list
/// elements and whitespace are ignored. `immutable` wins over `max-age`.
pub fn parse_max_age(header: &str) -> Option<u64> {
    let mut max_age = None;
    for directive in header.split(',') {
        let directive = directive.trim();
        if directive.is_empty() {
            continue;
        }
        let (name, value) = match directive.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (directive, None),
        };
        if name.eq_ignore_ascii_case("immutable") {
            return Some(IMMUTABLE_MAX_AGE);
        }
        if name.eq_ignore_ascii_case("max-age") && max_age.is_none() {
            max_age = value
                .map(|raw| raw.trim_matches('"'))
                .and_then(|raw| raw.parse::<u64>().ok());
        }
    }
    max_age
}

/// Max-age applied when an upstream response does not carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultMaxAgePolicy {
    pub success: u64,
    pub not_found: u64,
    pub error: u64,
}

impl Default for DefaultMaxAgePolicy {
    fn default() -> Self {
        Self {
            success: 60,
            not_found: 30,
            error: 10,
        }
    }
}

impl DefaultMaxAgePolicy {
    pub fn for_status(&self, status: u16) -> u64 {
        match status {
            200..=299 => self.success,
            404 => self.not_found,
            _ => self.error,
        }
    }
}
