//! Minimal HTTP/1.1 model owned by this crate (SPEC_FULL §3a).
//!
//! A full-service HTTP client library can't guarantee it won't buffer, pipeline, or otherwise
//! decide on its own when bytes leave the socket — which is exactly the property the
//! withhold-and-release trick needs. So instead of treating request/response types as an
//! external dependency, this module owns a small, swappable model: just enough HTTP/1.1 to
//! build one request and parse one response.

pub mod header;
pub mod method;
pub mod request;
pub mod response;
pub mod status;
pub mod url;
pub mod version;

pub use header::{Header, Headers};
pub use method::Method;
pub use request::Request;
pub use response::{BodyFraming, Response, ResponseParser};
pub use status::Status;
pub use url::{Scheme, Url};
pub use version::Version;
