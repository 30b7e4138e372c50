//! Error taxonomy (SPEC_FULL §7)
//!
//! Mirrors the teacher crate's `ParseError` shape (`Display` + `std::error::Error`, no derive
//! crate) rather than introducing `thiserror`/`anyhow` — nothing else in the retrieval pack's
//! networking repos reaches for one either.

use std::fmt;

/// Errors this harness can report, per SPEC_FULL §7.
#[derive(Debug)]
pub enum RaceError {
    /// DNS lookup failed or produced insufficient addresses for the chosen `connect_mode`.
    Resolution(String),
    /// TCP/TLS error.
    Transport(std::io::Error),
    /// Malformed response or truncated read.
    Protocol(String),
    /// A barrier did not fill within `barrier_timeout`.
    BarrierTimeout,
    /// A user callback panicked.
    Callback(String),
    /// Invalid race parameters.
    Configuration(String),
}

impl fmt::Display for RaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution(msg) => write!(f, "resolution failure: {msg}"),
            Self::Transport(err) => write!(f, "transport failure: {err}"),
            Self::Protocol(msg) => write!(f, "protocol failure: {msg}"),
            Self::BarrierTimeout => write!(f, "barrier timeout"),
            Self::Callback(msg) => write!(f, "callback failure: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration failure: {msg}"),
        }
    }
}

// `std::io::Error` has no `PartialEq`, so this can't be derived; `Transport` compares by error
// kind, which is all the test suite's `assert_eq!` calls need.
impl PartialEq for RaceError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Resolution(a), Self::Resolution(b)) => a == b,
            (Self::Transport(a), Self::Transport(b)) => a.kind() == b.kind(),
            (Self::Protocol(a), Self::Protocol(b)) => a == b,
            (Self::BarrierTimeout, Self::BarrierTimeout) => true,
            (Self::Callback(a), Self::Callback(b)) => a == b,
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            _ => false,
        }
    }
}

impl std::error::Error for RaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RaceError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err)
    }
}

impl From<crate::http::response::ParseError> for RaceError {
    fn from(err: crate::http::response::ParseError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<rustls::Error> for RaceError {
    fn from(err: rustls::Error) -> Self {
        Self::Transport(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}

/// Whether an error is per-worker (recorded, worker continues) or global (Driver aborts all
/// workers), per SPEC_FULL §7.
impl RaceError {
    /// `true` for errors that abort the whole run rather than just the current position.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::BarrierTimeout | Self::Configuration(_))
    }
}
