//! rustls client configurations and client certificate resolvers.

use crate::error::Result;
use crate::verifier::{MaterialProvider, SentinelServerVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, SignatureScheme};
use std::fmt;
use std::sync::Arc;

/// A rustls client configuration paired with the server name to connect with.
///
/// The server name is the sentinel name from the source's settings. Pass it
/// to the TLS connector (it becomes the SNI value) instead of the host being
/// dialed.
///
/// ```no_run
/// # async fn example(creds: identity_creds::DynamicCredentials) -> Result<(), Box<dyn std::error::Error>> {
/// use identity_creds::CredentialSource;
///
/// let (config, server_name) = creds.tls_config()?.into_parts();
/// let tcp = tokio::net::TcpStream::connect("10.0.0.7:3025").await?;
/// let tls = tokio_rustls::TlsConnector::from(config)
///     .connect(server_name, tcp)
///     .await?;
/// # drop(tls);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TlsClientConfig {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

impl TlsClientConfig {
    pub(crate) fn new(config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Self {
        Self {
            config,
            server_name,
        }
    }

    /// The rustls configuration.
    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Server name to use for SNI.
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Splits into the configuration and server name.
    pub fn into_parts(self) -> (Arc<ClientConfig>, ServerName<'static>) {
        (self.config, self.server_name)
    }
}

/// Builds a client config whose certificate, roots and verifier follow the
/// provider's current generation.
pub(crate) fn dynamic_client_config(
    provider: &Arc<dyn MaterialProvider>,
    server_name: ServerName<'static>,
    crypto: Arc<CryptoProvider>,
    alpn_protocols: Vec<Vec<u8>>,
) -> Result<ClientConfig> {
    let verifier = Arc::new(SentinelServerVerifier::new(Arc::clone(provider), server_name));
    let resolver = Arc::new(CurrentCertResolver {
        provider: Arc::clone(provider),
    });

    let mut cfg = ClientConfig::builder_with_provider(crypto)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_cert_resolver(resolver);

    cfg.alpn_protocols = alpn_protocols;
    Ok(cfg)
}

/// Presents the current generation's certificate on every handshake, whatever
/// issuers the server advertises.
struct CurrentCertResolver {
    provider: Arc<dyn MaterialProvider>,
}

impl fmt::Debug for CurrentCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentCertResolver").finish_non_exhaustive()
    }
}

impl ResolvesClientCert for CurrentCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.provider.current_material().certified_key))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Presents one fixed certificate on every handshake.
pub(crate) struct FixedCertResolver(pub(crate) Arc<CertifiedKey>);

impl fmt::Debug for FixedCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedCertResolver")
            .field("chain_len", &self.0.cert.len())
            .finish()
    }
}

impl ResolvesClientCert for FixedCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }

    fn has_certs(&self) -> bool {
        true
    }
}
