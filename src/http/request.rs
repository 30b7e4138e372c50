//! Request descriptor and its single-shot byte serialization
//!
//! The whole withhold-and-release trick hinges on one property: the bytes written before
//! `RELEASE` and the bytes written after must be two slices over *one* serialization, never two
//! independently-built buffers. [`Request::split_for_tail`] is the only place that property is
//! allowed to be established.

use std::collections::HashMap;

use super::{header::Headers, method::Method, url::Url, version::Version};

/// An immutable-once-built HTTP/1.1 request, per SPEC_FULL §3.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers, in the order they'll be written.
    pub headers: Headers,
    /// Request body. Empty for methods that typically carry none.
    pub body: Vec<u8>,
    /// Cookies to apply as a `Cookie` header at send time, merged with the worker's jar
    /// (SPEC_FULL §4.3 step 2).
    pub cookies: HashMap<String, String>,
}

impl Request {
    /// Starts building a request for `method url`.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Vec::new(),
            cookies: HashMap::new(),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Sets the body, also setting `Content-Length` (the only framing this harness supports —
    /// no chunked request bodies, per SPEC_FULL §6).
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a cookie, applied at send time alongside the worker's jar.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Serializes the request line, headers, and body into one buffer: the single-shot form
    /// this harness must reproduce byte-for-byte once `RELEASE` opens (P2).
    ///
    /// `extra_cookies` are merged in ahead of `self.cookies` (worker-jar cookies come first, the
    /// request's own take precedence on conflicting names) and folded into one `Cookie` header,
    /// matching RFC 6265 §5.4's single-header requirement.
    pub fn serialize(&self, extra_cookies: &HashMap<String, String>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256 + self.body.len());

        buf.extend_from_slice(self.method.to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.url.target().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(Version::H1_1.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"Host: ");
        buf.extend_from_slice(self.url.host_header().as_bytes());
        buf.extend_from_slice(b"\r\n");

        for header in &self.headers {
            if header.name.eq_ignore_ascii_case("host")
                || header.name.eq_ignore_ascii_case("content-length")
                || header.name.eq_ignore_ascii_case("cookie")
            {
                continue;
            }
            buf.extend_from_slice(header.name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(header.value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        let cookie_header = self.cookie_header(extra_cookies);
        if !cookie_header.is_empty() {
            buf.extend_from_slice(b"Cookie: ");
            buf.extend_from_slice(cookie_header.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"Content-Length: ");
        buf.extend_from_slice(self.body.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Builds the folded `Cookie` header value from the worker jar plus this request's own
    /// cookies, the latter winning on name conflicts.
    pub fn cookie_header(&self, extra_cookies: &HashMap<String, String>) -> String {
        let mut merged = extra_cookies.clone();
        merged.extend(self.cookies.clone());
        if merged.is_empty() {
            return String::new();
        }
        let mut pairs: Vec<_> = merged.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Splits a single serialization into the pre-release prefix and the withheld tail.
    ///
    /// If the body is at least `tail_bytes` long, the tail is drawn from the body's end (the
    /// common case for POST/PUT races). Otherwise — a GET with a short or empty body — the tail
    /// is drawn backward from the header terminator `\r\n\r\n`, so a bodyless request still
    /// withholds real bytes instead of sending a complete frame immediately (SPEC_FULL §4.1).
    ///
    /// `tail_bytes` is clamped to the total length, so a race with `tail_bytes` larger than the
    /// whole request still behaves — the entire request is withheld.
    pub fn split_for_tail(serialized: &[u8], tail_bytes: usize) -> (&[u8], &[u8]) {
        let tail_bytes = tail_bytes.min(serialized.len());
        let split_at = serialized.len() - tail_bytes;
        serialized.split_at(split_at)
    }
}
