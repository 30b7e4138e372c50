//! Representation of the HTTP version used on the wire

use std::fmt::Display;

/// Representation of the requested HTTP version
///
/// Only `H1_0` and `H1_1` are ever produced by a [`Connection`](crate::connection::Connection) —
/// `H2`/`H3` exist so a malformed or upgrading response can be rejected with a descriptive
/// [`ProtocolFailure`](crate::error::RaceError::Protocol) instead of a generic parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    H1_0,
    /// HTTP/1.1
    H1_1,
    /// HTTP/2 — rejected; the tail-withholding trick does not survive HPACK framing
    H2,
    /// HTTP/3 — rejected for the same reason as `H2`
    H3,
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::H1_0 => "HTTP/1.0",
            Self::H1_1 => "HTTP/1.1",
            Self::H2 => "HTTP/2",
            Self::H3 => "HTTP/3",
        })
    }
}

impl Version {
    /// Parses the version token from a response status line, e.g. `HTTP/1.1`.
    pub fn parse(token: &[u8]) -> Option<Self> {
        match token {
            b"HTTP/1.0" => Some(Self::H1_0),
            b"HTTP/1.1" => Some(Self::H1_1),
            b"HTTP/2" | b"HTTP/2.0" => Some(Self::H2),
            b"HTTP/3" => Some(Self::H3),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Version;

    #[test]
    fn parses_h1_1_token() {
        assert_eq!(Some(Version::H1_1), Version::parse(b"HTTP/1.1"));
    }

    #[test]
    fn rejects_unknown_token() {
        assert_eq!(None, Version::parse(b"SPDY/1"));
    }
}
