//! `barrage` — the synchronized-send engine behind an HTTP/HTTPS race-condition testing harness.
//!
//! This crate is the connection layer and coordinating driver that implement the
//! "withhold-and-release" protocol: establish every socket, write all but the last few bytes of
//! each request, block every worker on a shared barrier, then flush the trailing bytes of every
//! request in one go so the target server receives them within as small a window as the network
//! permits.
//!
//! Request/response modeling, connection pooling, DNS/IP selection, cookie handling, template
//! substitution, and the three-phase barrier synchronization all live here; a CLI, configuration
//! file format, and structured logging sit on top in [`bin/barrage.rs`](../src/bin/barrage.rs).

pub mod barrier;
pub mod config;
pub mod connection;
pub mod cookie;
pub mod dns;
pub mod driver;
pub mod error;
pub mod http;
pub mod logging;
pub mod pool;
pub mod template;
pub mod tls;
pub mod worker;

pub use config::RaceConfig;
pub use driver::{Driver, Work};
pub use error::RaceError;
pub use worker::{Callback, RequestSpec, WorkItem, WorkerHandle, WorkerResult};
