//! Minimal absolute-URL model
//!
//! Only what SPEC_FULL §3 needs: scheme, host, port, path, and query — no relative references,
//! no percent-decoding beyond what's required to split the components.

use std::fmt;

use crate::error::RaceError;

/// URL scheme this harness understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plaintext HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Default port for the scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    /// Whether a [`Connection`](crate::connection::Connection) for this scheme needs TLS.
    pub fn is_tls(self) -> bool {
        matches!(self, Self::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Https => "https",
        })
    }
}

/// A parsed absolute URL: `scheme://host[:port][/path][?query]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    /// `http` or `https`.
    pub scheme: Scheme,
    /// Hostname or IP literal (brackets stripped for IPv6).
    pub host: String,
    /// Port, defaulted from the scheme if absent in the text form.
    pub port: u16,
    /// Path, including the leading `/`. Empty input defaults to `/`.
    pub path: String,
    /// Raw query string, without the leading `?`. `None` if absent.
    pub query: Option<String>,
}

impl Url {
    /// Parses an absolute URL.
    pub fn parse(input: &str) -> Result<Self, RaceError> {
        let (scheme_str, rest) = input
            .split_once("://")
            .ok_or_else(|| RaceError::Configuration(format!("not an absolute URL: {input}")))?;

        let scheme = match scheme_str.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(RaceError::Configuration(format!(
                    "unsupported scheme {other} (only http/https)"
                )))
            }
        };

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if authority.is_empty() {
            return Err(RaceError::Configuration(format!(
                "missing host in URL: {input}"
            )));
        }

        let (host, port) = match authority.rsplit_once(':') {
            // IPv6 literal like [::1] has colons inside it; only split on a port-looking suffix.
            Some((host, port_str)) if !host.is_empty() && port_str.chars().all(|c| c.is_ascii_digit()) =>
            {
                let port: u16 = port_str.parse().map_err(|_| {
                    RaceError::Configuration(format!("invalid port in URL: {input}"))
                })?;
                (host.to_string(), port)
            }
            _ => (authority.to_string(), scheme.default_port()),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };

        let path = if path.is_empty() { "/".to_string() } else { path };

        Ok(Self {
            scheme,
            host,
            port,
            path,
            query,
        })
    }

    /// The `request-target` as it appears on the request line: path plus `?query` if present.
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// `host[:port]` as used in the mandatory `Host` header, per RFC 7230 — the port is included
    /// only when it differs from the scheme's default.
    pub fn host_header(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Scheme, Url};

    #[test]
    fn parses_scheme_host_port_path_query() {
        let url = Url::parse("https://example.test:8443/a/b?x=1").unwrap();
        assert_eq!(Scheme::Https, url.scheme);
        assert_eq!("example.test", url.host);
        assert_eq!(8443, url.port);
        assert_eq!("/a/b", url.path);
        assert_eq!(Some("x=1".to_string()), url.query);
    }

    #[test]
    fn defaults_port_from_scheme() {
        let url = Url::parse("http://example.test/").unwrap();
        assert_eq!(80, url.port);
    }

    #[test]
    fn defaults_path_to_root() {
        let url = Url::parse("http://example.test").unwrap();
        assert_eq!("/", url.path);
        assert_eq!(None, url.query);
    }

    #[test]
    fn host_header_omits_default_port() {
        let url = Url::parse("http://example.test:80/").unwrap();
        assert_eq!("example.test", url.host_header());
        let url = Url::parse("http://example.test:8080/").unwrap();
        assert_eq!("example.test:8080", url.host_header());
    }

    #[test]
    fn rejects_relative_or_unknown_scheme() {
        assert!(Url::parse("/just/a/path").is_err());
        assert!(Url::parse("ftp://example.test/").is_err());
    }
}
