//! Incremental HTTP/1.1 response parser
//!
//! Unlike the request side, a response arrives in whatever chunks the socket hands back, so
//! this parser is fed bytes incrementally and reports whether it has a complete status line +
//! header block yet. There is no chunked-transfer decoding (SPEC_FULL §3a) — a target that
//! replies with `Transfer-Encoding: chunked` or without `Content-Length` is read to socket close.

use std::fmt;

use super::{header::Headers, status::Status, version::Version};

/// Failures while parsing a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The status line wasn't `VERSION SP CODE SP REASON CRLF`.
    StatusLine,
    /// A header line wasn't `name: value`.
    HeaderLine,
    /// The socket closed (or EOF was seen) before a complete status line + headers arrived.
    Truncated,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StatusLine => "malformed status line",
            Self::HeaderLine => "malformed header line",
            Self::Truncated => "connection closed before headers completed",
        })
    }
}

impl std::error::Error for ParseError {}

/// Result whose `Err` variant is [`ParseError`].
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// What's known about the body once headers are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Exactly `n` more bytes follow.
    Length(usize),
    /// No `Content-Length` or `Transfer-Encoding` header; read to socket close.
    UntilClose,
    /// The response (e.g. to a `HEAD` request, or a `204`/`304`) has no body by definition.
    None,
}

/// A parsed response: status line, headers, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP version reported by the status line.
    pub version: Version,
    /// Status code.
    pub status: Status,
    /// Response headers.
    pub headers: Headers,
    /// Body bytes, fully read.
    pub body: Vec<u8>,
}

/// Drives the incremental status-line + header parse, then the body read, over whatever bytes
/// a [`Connection`](crate::connection::Connection) hands it.
#[derive(Debug, Default)]
pub struct ResponseParser {
    buf: Vec<u8>,
    head: Option<(Version, Status, Headers, usize)>,
}

impl ResponseParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-read bytes in. Returns `true` once the status line and headers are complete
    /// (the body may still need more reads, tracked separately by the caller).
    pub fn feed(&mut self, bytes: &[u8]) -> ParseResult<bool> {
        if self.head.is_some() {
            self.buf.extend_from_slice(bytes);
            return Ok(true);
        }

        self.buf.extend_from_slice(bytes);

        let Some(header_end) = find_double_crlf(&self.buf) else {
            return Ok(false);
        };

        let head_bytes = self.buf[..header_end].to_vec();
        let body_start = header_end + 4;
        let mut lines = head_bytes.split(|&b| b == b'\n').map(strip_cr);

        let status_line = lines.next().ok_or(ParseError::StatusLine)?;
        let (version, status) = parse_status_line(status_line)?;

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(|c: char| c == ':')
                .ok_or(ParseError::HeaderLine)?;
            headers.push(name.trim(), value.trim());
        }

        self.head = Some((version, status, headers, body_start));
        self.buf.drain(..body_start);
        Ok(true)
    }

    /// `true` once [`feed`](Self::feed) has returned `true` at least once.
    pub fn headers_complete(&self) -> bool {
        self.head.is_some()
    }

    /// How the body is framed, once headers are known.
    pub fn body_framing(&self, request_had_head_method: bool) -> Option<BodyFraming> {
        let (_, status, headers, _) = self.head.as_ref()?;

        if request_had_head_method
            || matches!(status.code(), 204 | 304)
            || (100..200).contains(&status.code())
        {
            return Some(BodyFraming::None);
        }

        if let Some(len) = headers.get("content-length") {
            return Some(BodyFraming::Length(len.trim().parse().ok()?));
        }

        if headers
            .get("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
        {
            // Not decoded (SPEC_FULL §3a); treated as an unbounded body read to close.
            return Some(BodyFraming::UntilClose);
        }

        Some(BodyFraming::UntilClose)
    }

    /// Bytes of body already buffered past the header block.
    pub fn buffered_body(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the parser, producing the finished [`Response`] once the body is fully read and
    /// appended via repeated [`feed`](Self::feed) calls (or left as buffered tail for
    /// `UntilClose` framing).
    pub fn finish(self, extra_body: &[u8]) -> ParseResult<Response> {
        let (version, status, headers, _) = self.head.ok_or(ParseError::Truncated)?;
        let mut body = self.buf;
        body.extend_from_slice(extra_body);
        Ok(Response {
            version,
            status,
            headers,
            body,
        })
    }
}

fn strip_cr(line: &[u8]) -> &str {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    std::str::from_utf8(line).unwrap_or("")
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_status_line(line: &str) -> ParseResult<(Version, Status)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().ok_or(ParseError::StatusLine)?;
    let code = parts.next().ok_or(ParseError::StatusLine)?;
    // reason phrase, parts.next(), is intentionally not retained.

    let version = Version::parse(version.as_bytes()).ok_or(ParseError::StatusLine)?;
    let code: u16 = code.parse().map_err(|_| ParseError::StatusLine)?;

    Ok((version, Status::from_code(code)))
}
