//! ConnectionPool / Adapter shim (SPEC_FULL §4.2)
//!
//! Thin by design: the withhold-and-release trick needs no keep-alive, so this isn't a real
//! connection-reuse pool. Its only job is to be the single choke point where a host's resolved
//! address list is cached and `connect_mode` is applied, so the `same`/`different` policies are
//! computed once per host rather than recomputed (and potentially re-resolved to a different
//! address) by every Connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use crate::connection::ConnectTarget;
use crate::dns::{self, ConnectMode};
use crate::error::RaceError;
use crate::http::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    host: String,
    port: u16,
}

/// Caches per-host address resolution across the Connections a race creates.
#[derive(Debug, Default)]
pub struct Pool {
    resolved: Mutex<HashMap<PoolKey, Vec<SocketAddr>>>,
}

impl Pool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `url`'s host (once, cached thereafter) and applies `mode` to pick the address
    /// this `worker_id` of `worker_count` should dial, returning a ready-to-use
    /// [`ConnectTarget`].
    pub fn target_for(
        &self,
        url: &Url,
        mode: ConnectMode,
        worker_id: usize,
        worker_count: usize,
    ) -> Result<ConnectTarget, RaceError> {
        let key = PoolKey {
            host: url.host.to_ascii_lowercase(),
            port: url.port,
        };

        let addrs = {
            let mut resolved = self.resolved.lock().unwrap();
            if let Some(addrs) = resolved.get(&key) {
                addrs.clone()
            } else {
                let addrs = dns::resolve(&url.host, url.port)?;
                resolved.insert(key, addrs.clone());
                addrs
            }
        };

        let addr = dns::select_address(&addrs, mode, worker_id, worker_count)?;

        Ok(ConnectTarget {
            scheme: url.scheme,
            host: url.host.clone(),
            addr,
        })
    }
}
