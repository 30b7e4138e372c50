//! Client TLS configuration (SPEC_FULL §4.1)
//!
//! Built the same way the teacher's `ServerConfig`-based `TlsConnection` expects its
//! counterpart — same `rustls` major version, same `ring` crypto provider already selected in
//! `Cargo.toml`'s feature list — just the client-side `ClientConfig` builder, grounded on the
//! `rustls::ClientConfig::builder_with_provider(...).with_safe_default_protocol_versions()`
//! shape used against trust stores and custom verifiers alike in the retrieval pack's proxy and
//! sandbox examples.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};

/// Builds a `rustls::ClientConfig`.
///
/// When `verify` is `false` this installs a verifier that accepts any certificate chain — only
/// ever appropriate for a race fixture under the tester's own control (SPEC_FULL's
/// `send_kwargs.verify_tls`), never for an unattended run against a real target.
pub fn client_config(verify: bool) -> Arc<ClientConfig> {
    let builder =
        ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .expect("ring provider supports the safe default protocol versions");

    let config = if verify {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify))
            .with_no_client_auth()
    };

    Arc::new(config)
}

/// Accepts any certificate. Used only when the caller explicitly disabled verification.
#[derive(Debug)]
struct NoVerify;

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod test {
    use super::client_config;

    #[test]
    fn builds_both_verify_and_no_verify_configs() {
        let _ = client_config(true);
        let _ = client_config(false);
    }
}
