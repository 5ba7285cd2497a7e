//! Server certificate verification against the current material generation.

use crate::material::MaterialSnapshot;
use crate::prelude::debug;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::fmt;
use std::sync::Arc;

/// Access to the current material snapshot.
///
/// Implemented by the dynamic provider and by fixed providers in tests, so
/// verifiers and resolvers can be exercised without a loader.
pub(crate) trait MaterialProvider: Send + Sync {
    fn current_material(&self) -> Arc<MaterialSnapshot>;
}

/// Verifies server chains against the roots of the generation current at
/// handshake time, checking the sentinel name instead of the dialed one.
///
/// Cluster servers are reached through tunnels and proxies, so the address a
/// client dials rarely appears in the server certificate. Every server
/// certificate carries the sentinel name, and the chain is verified for it
/// regardless of the `server_name` rustls passes in. Everything else (chain
/// building from the presented intermediates, validity, key usage, handshake
/// signatures) is standard WebPKI verification.
pub(crate) struct SentinelServerVerifier {
    provider: Arc<dyn MaterialProvider>,
    server_name: ServerName<'static>,
}

impl SentinelServerVerifier {
    pub(crate) fn new(provider: Arc<dyn MaterialProvider>, server_name: ServerName<'static>) -> Self {
        Self {
            provider,
            server_name,
        }
    }
}

impl fmt::Debug for SentinelServerVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelServerVerifier")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for SentinelServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let snap = self.provider.current_material();

        snap.server_verifier
            .verify_server_cert(end_entity, intermediates, &self.server_name, ocsp_response, now)
            .inspect_err(|e| {
                debug!(
                    "server certificate rejected (dialed {server_name:?}, generation {}): {e}",
                    snap.generation
                );
            })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.provider
            .current_material()
            .server_verifier
            .verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.provider
            .current_material()
            .server_verifier
            .verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .current_material()
            .server_verifier
            .supported_verify_schemes()
    }
}
