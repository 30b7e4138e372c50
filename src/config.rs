//! Typed, validated race parameters (SPEC_FULL §3, §4.5)
//!
//! `RaceConfig::new` performs every `ConfigurationFailure` check up front, so a malformed
//! configuration is rejected before a single socket is touched — mirroring the teacher's habit of
//! validating at construction (see e.g. its header-parsing rejecting malformed input immediately
//! rather than letting it reach I/O).

use std::time::Duration;

use crate::dns::ConnectMode;
use crate::error::RaceError;
use crate::http::Url;

/// Default barrier wait bound, per SPEC_FULL §3.
pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout, used when `send_kwargs.request_timeout` is unset.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated race parameters, threaded Driver → Worker → Pool → Connection (SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Whether to scan request fields for `<<<expr>>>` markers before sending.
    pub do_eval: bool,
    /// Whether to copy outgoing `Cookie` entries into the worker's jar after sending.
    pub save_sent_cookies: bool,
    /// Whether to verify the race target's TLS certificate.
    pub verify_tls: bool,
    /// Optional HTTP proxy. Accepted here; CONNECT-tunneling through it is not yet implemented
    /// in the send path (see DESIGN.md).
    // TODO: wire proxy into Connection::connect as a CONNECT tunnel once a fixture exercises it.
    pub proxy: Option<Url>,
    /// Per-connection timeout, covering both TCP connect and the overall exchange.
    pub request_timeout: Option<Duration>,
    /// IP selection policy for multi-address hosts.
    pub connect_mode: ConnectMode,
    /// Number of bytes withheld until `RELEASE`. Must be at least 1.
    pub tail_bytes: usize,
    /// Upper bound on any single barrier wait.
    pub barrier_timeout: Duration,
}

impl RaceConfig {
    /// Builds a `RaceConfig`, applying every `ConfigurationFailure` check SPEC_FULL §4.5 names:
    /// `tail_bytes >= 1` and `barrier_timeout > 0`. `connect_mode` is already a validated enum by
    /// the time it reaches here (parsing happens at the CLI boundary), so there's nothing further
    /// to check on it.
    pub fn new(
        connect_mode: ConnectMode,
        tail_bytes: usize,
        barrier_timeout: Duration,
    ) -> Result<Self, RaceError> {
        if tail_bytes == 0 {
            return Err(RaceError::Configuration(
                "tail_bytes must be at least 1".to_string(),
            ));
        }
        if barrier_timeout.is_zero() {
            return Err(RaceError::Configuration(
                "barrier_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            do_eval: false,
            save_sent_cookies: false,
            verify_tls: true,
            proxy: None,
            request_timeout: None,
            connect_mode,
            tail_bytes,
            barrier_timeout,
        })
    }

    /// Builder-style setter for `do_eval`.
    pub fn with_do_eval(mut self, do_eval: bool) -> Self {
        self.do_eval = do_eval;
        self
    }

    /// Builder-style setter for `save_sent_cookies`.
    pub fn with_save_sent_cookies(mut self, save_sent_cookies: bool) -> Self {
        self.save_sent_cookies = save_sent_cookies;
        self
    }

    /// Builder-style setter for `verify_tls`.
    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Builder-style setter for `proxy`.
    pub fn with_proxy(mut self, proxy: Option<Url>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Builder-style setter for `request_timeout`.
    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// The connect timeout to use for a Connection: `request_timeout` if set, else
    /// [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn connect_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// The read/write timeout to apply to a Connection's socket once it's established:
    /// `request_timeout` if set, else `barrier_timeout`.
    ///
    /// A stalled target (SPEC_FULL §8 scenario 6) must not leave a worker blocked in a
    /// timeout-less `read`/`write` forever — the Driver's barrier timeout alone can't reach in
    /// and interrupt blocking socket I/O, so the socket itself needs a bound no looser than the
    /// barrier timeout it's meant to cooperate with.
    pub fn io_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(self.barrier_timeout)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_zero_tail_bytes() {
        assert!(RaceConfig::new(ConnectMode::Same, 0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn rejects_zero_barrier_timeout() {
        assert!(RaceConfig::new(ConnectMode::Same, 1, Duration::ZERO).is_err());
    }

    #[test]
    fn accepts_valid_parameters() {
        let config = RaceConfig::new(ConnectMode::Random, 4, Duration::from_secs(5)).unwrap();
        assert_eq!(4, config.tail_bytes);
        assert!(config.verify_tls);
    }

    #[test]
    fn request_timeout_falls_back_to_default_connect_timeout() {
        let config = RaceConfig::new(ConnectMode::Same, 1, Duration::from_secs(1)).unwrap();
        assert_eq!(DEFAULT_CONNECT_TIMEOUT, config.connect_timeout());
    }

    #[test]
    fn io_timeout_falls_back_to_barrier_timeout() {
        let config = RaceConfig::new(ConnectMode::Same, 1, Duration::from_secs(7)).unwrap();
        assert_eq!(Duration::from_secs(7), config.io_timeout());
    }

    #[test]
    fn io_timeout_prefers_request_timeout_when_set() {
        let config = RaceConfig::new(ConnectMode::Same, 1, Duration::from_secs(30))
            .unwrap()
            .with_request_timeout(Some(Duration::from_secs(3)));
        assert_eq!(Duration::from_secs(3), config.io_timeout());
    }
}
