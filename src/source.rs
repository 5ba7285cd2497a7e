//! The credential source abstraction and its fixed-material implementations.

use crate::crypto::default_provider;
use crate::error::{Error, Result};
use crate::loader::read_file;
use crate::material::{cert_chain_from_pem, certified_key, private_key_from_pem, roots_from_pems};
use crate::settings::{merge_alpn, CredentialSettings};
use crate::ssh::SshClientConfig;
use crate::tls::{FixedCertResolver, TlsClientConfig};
use rustls::ClientConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Something that can hand out TLS and SSH client configurations.
///
/// Callers ask for a fresh config for every connection they set up; sources
/// that rotate material make sure each config reflects the rotation.
pub trait CredentialSource: Send + Sync {
    /// Returns a TLS client configuration.
    ///
    /// # Errors
    ///
    /// Source-specific; see each implementation.
    fn tls_config(&self) -> Result<TlsClientConfig>;

    /// Returns an SSH client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] for sources without SSH material.
    fn ssh_config(&self) -> Result<SshClientConfig>;
}

impl<S: CredentialSource + ?Sized> CredentialSource for Arc<S> {
    fn tls_config(&self) -> Result<TlsClientConfig> {
        (**self).tls_config()
    }

    fn ssh_config(&self) -> Result<SshClientConfig> {
        (**self).ssh_config()
    }
}

/// Wraps a caller-supplied rustls configuration.
///
/// Each call returns a copy with the configured ALPN protocols appended and
/// the sentinel server name attached. The wrapped configuration is never
/// modified.
#[derive(Clone, Debug)]
pub struct StaticTlsCredentials {
    config: Arc<ClientConfig>,
    settings: CredentialSettings,
}

impl StaticTlsCredentials {
    /// Wraps `config` with default settings.
    pub fn new(config: impl Into<Arc<ClientConfig>>) -> Self {
        Self::with_settings(config, CredentialSettings::default())
    }

    /// Wraps `config` with explicit settings.
    pub fn with_settings(config: impl Into<Arc<ClientConfig>>, settings: CredentialSettings) -> Self {
        Self {
            config: config.into(),
            settings,
        }
    }
}

impl CredentialSource for StaticTlsCredentials {
    fn tls_config(&self) -> Result<TlsClientConfig> {
        let mut cfg = (*self.config).clone();
        cfg.alpn_protocols = merge_alpn(&cfg.alpn_protocols, &self.settings.alpn_protocols);
        Ok(TlsClientConfig::new(
            Arc::new(cfg),
            self.settings.sentinel_server_name()?,
        ))
    }

    fn ssh_config(&self) -> Result<SshClientConfig> {
        Err(Error::NotImplemented(
            "static TLS credentials do not provide an SSH configuration",
        ))
    }
}

/// Reads a certificate, key and roots from files on every call.
///
/// Nothing is cached, so replacing the files takes effect on the next call.
/// The server is verified with standard WebPKI verification for the sentinel
/// name, and the client certificate is always presented.
#[derive(Clone, Debug)]
pub struct KeyPairCredentials {
    cert_file: PathBuf,
    key_file: PathBuf,
    roots_file: PathBuf,
    settings: CredentialSettings,
}

impl KeyPairCredentials {
    /// Creates a source reading the given PEM files, with default settings.
    pub fn new(
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
        roots_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            roots_file: roots_file.into(),
            settings: CredentialSettings::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn settings(mut self, settings: CredentialSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl CredentialSource for KeyPairCredentials {
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if a file cannot be read and
    /// [`Error::Malformed`] if its contents do not parse or the key does not
    /// match the certificate.
    fn tls_config(&self) -> Result<TlsClientConfig> {
        let chain = cert_chain_from_pem(&read_file("tls certificate", &self.cert_file)?)?;
        let key = private_key_from_pem(&zeroize::Zeroizing::new(read_file(
            "tls private key",
            &self.key_file,
        )?))?;
        let roots_pem = read_file("tls root certificates", &self.roots_file)?;
        let roots = roots_from_pems([roots_pem.as_slice()])?;

        let crypto = default_provider();
        let certified_key = certified_key(chain, key, &crypto)?;

        let mut cfg = ClientConfig::builder_with_provider(crypto)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_client_cert_resolver(Arc::new(FixedCertResolver(certified_key)));
        cfg.alpn_protocols = merge_alpn(&cfg.alpn_protocols, &self.settings.alpn_protocols);

        Ok(TlsClientConfig::new(
            Arc::new(cfg),
            self.settings.sentinel_server_name()?,
        ))
    }

    fn ssh_config(&self) -> Result<SshClientConfig> {
        Err(Error::NotImplemented(
            "key pair credentials do not provide an SSH configuration",
        ))
    }
}
