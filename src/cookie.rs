//! Session cookie jar (SPEC_FULL §3, §4.3)
//!
//! An RFC-6265-lite jar: keyed on `(domain, path, name)`, last-write-wins, no expiry or
//! attribute handling. The distilled spec's own design notes (§9) call this out explicitly as
//! the right-sized replacement for a full cookie-jar implementation borrowed from an HTTP
//! library — the race use case only ever needs "what did this worker last see for this host".

use std::collections::HashMap;

/// Key a cookie is stored under: host-scoped, path-scoped, name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

/// Per-Worker cookie jar.
#[derive(Debug, Clone, Default)]
pub struct Jar {
    entries: HashMap<CookieKey, String>,
}

impl Jar {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records or overwrites a cookie for `domain`/`path`.
    pub fn set(&mut self, domain: &str, path: &str, name: &str, value: &str) {
        self.entries.insert(
            CookieKey {
                domain: domain.to_ascii_lowercase(),
                path: path.to_string(),
                name: name.to_string(),
            },
            value.to_string(),
        );
    }

    /// All cookies visible to a request at `domain`/`path`: path-prefix match, domain exact
    /// match (no subdomain wildcarding — kept simple per the distilled spec's own scope cut).
    pub fn for_request(&self, domain: &str, path: &str) -> HashMap<String, String> {
        let domain = domain.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| key.domain == domain && path.starts_with(&key.path))
            .map(|(key, value)| (key.name.clone(), value.clone()))
            .collect()
    }

    /// Merges `Set-Cookie` response headers into the jar for `domain`, using `path` as the
    /// default scope (cookie `Path=` attributes are not parsed — the value is taken as-is up to
    /// the first `;`).
    pub fn merge_set_cookie<'a>(
        &mut self,
        domain: &str,
        path: &str,
        set_cookie_values: impl Iterator<Item = &'a str>,
    ) {
        for raw in set_cookie_values {
            let first_pair = raw.split(';').next().unwrap_or(raw).trim();
            if let Some((name, value)) = first_pair.split_once('=') {
                self.set(domain, path, name.trim(), value.trim());
            }
        }
    }

    /// Merges an outgoing `Cookie` header's pairs into the jar (used when `save_sent_cookies` is
    /// set, SPEC_FULL §3).
    pub fn merge_cookie_header(&mut self, domain: &str, path: &str, header_value: &str) {
        for pair in header_value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                self.set(domain, path, name.trim(), value.trim());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Jar;

    #[test]
    fn for_request_matches_domain_and_path_prefix() {
        let mut jar = Jar::new();
        jar.set("example.test", "/", "k", "1");
        let cookies = jar.for_request("example.test", "/a/b");
        assert_eq!(Some(&"1".to_string()), cookies.get("k"));
    }

    #[test]
    fn different_domain_is_not_visible() {
        let mut jar = Jar::new();
        jar.set("example.test", "/", "k", "1");
        assert!(jar.for_request("other.test", "/").is_empty());
    }

    #[test]
    fn merge_set_cookie_last_write_wins() {
        let mut jar = Jar::new();
        jar.merge_set_cookie("example.test", "/", vec!["k=1; Path=/"].into_iter());
        jar.merge_set_cookie("example.test", "/", vec!["k=2"].into_iter());
        let cookies = jar.for_request("example.test", "/");
        assert_eq!(Some(&"2".to_string()), cookies.get("k"));
    }

    #[test]
    fn merge_cookie_header_splits_multiple_pairs() {
        let mut jar = Jar::new();
        jar.merge_cookie_header("example.test", "/", "a=1; b=2");
        let cookies = jar.for_request("example.test", "/");
        assert_eq!(Some(&"1".to_string()), cookies.get("a"));
        assert_eq!(Some(&"2".to_string()), cookies.get("b"));
    }
}
