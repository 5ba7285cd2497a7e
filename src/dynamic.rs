//! A credential source whose material can be reloaded at runtime.

use crate::crypto::default_provider;
use crate::error::Result;
use crate::loader::Loader;
use crate::material::{build_material, MaterialSnapshot};
use crate::prelude::{error, info};
use crate::settings::CredentialSettings;
use crate::source::CredentialSource;
use crate::ssh::{self, CertSigner, HostKey, HostKeyCallback, SignersCallback, SshClientConfig};
use crate::sync::{self, Mutex, RwLock};
use crate::tls::{dynamic_client_config, TlsClientConfig};
use crate::verifier::MaterialProvider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Credentials backed by a [`Loader`], swappable with [`reload`].
///
/// Configs handed out by [`tls_config`] and [`ssh_config`] do not capture
/// material. Their certificate resolver, server verifier, signer factory and
/// host key check look up the current generation each time they run, so a
/// reload takes effect on the next handshake of every config ever returned,
/// without rebuilding connections or configs.
///
/// Cloning is cheap; clones share the same material.
///
/// [`reload`]: DynamicCredentials::reload
/// [`tls_config`]: CredentialSource::tls_config
/// [`ssh_config`]: CredentialSource::ssh_config
///
/// # Examples
///
/// ```no_run
/// use identity_creds::{CredentialSource, DynamicCredentials, FileLoader};
///
/// # fn example() -> Result<(), identity_creds::Error> {
/// let creds = DynamicCredentials::new(FileLoader::from_dir("/var/lib/agent/creds"))?;
/// let tls = creds.tls_config()?;
///
/// // ... after the files on disk were renewed:
/// creds.reload()?;
/// # drop(tls);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DynamicCredentials {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Box<dyn Loader>,
    settings: CredentialSettings,
    server_name: ServerName<'static>,
    crypto: Arc<CryptoProvider>,
    // Serializes reloads. Never held by readers.
    reload_lock: Mutex<()>,
    material: RwLock<Arc<MaterialSnapshot>>,
}

impl MaterialProvider for Inner {
    fn current_material(&self) -> Arc<MaterialSnapshot> {
        Arc::clone(&sync::read(&self.material))
    }
}

impl fmt::Debug for DynamicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCredentials")
            .field("settings", &self.inner.settings)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl DynamicCredentials {
    /// Loads material with `loader` and default settings.
    ///
    /// # Errors
    ///
    /// Fails if the initial load or parse fails.
    pub fn new(loader: impl Loader) -> Result<Self> {
        Self::builder(loader).build()
    }

    /// Starts building credentials around `loader`.
    pub fn builder(loader: impl Loader) -> DynamicCredentialsBuilder {
        DynamicCredentialsBuilder::new(Box::new(loader))
    }

    /// Loads and parses fresh material, then makes it current.
    ///
    /// The loader runs without the material lock held, so handshakes in
    /// progress are never blocked on I/O. Either every piece is replaced or,
    /// on error, nothing is: the previous generation stays current.
    /// Concurrent calls are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unavailable`] if the loader fails to read and
    /// [`crate::Error::Malformed`] if anything it returned does not parse.
    pub fn reload(&self) -> Result<()> {
        let _reloading = sync::lock(&self.inner.reload_lock);

        let next = self.generation() + 1;
        let snapshot = match load_snapshot(self.inner.loader.as_ref(), next, &self.inner.crypto) {
            Ok(s) => s,
            Err(e) => {
                error!("credential reload failed, keeping generation {}: {e}", next - 1);
                return Err(e);
            }
        };

        *sync::write(&self.inner.material) = Arc::new(snapshot);
        info!("credential material reloaded; generation={next}");
        Ok(())
    }

    /// Generation of the current material. Starts at 1 and grows by one per
    /// successful reload.
    pub fn generation(&self) -> u64 {
        self.inner.current_material().generation
    }

    /// Settings applied to generated configs.
    pub fn settings(&self) -> &CredentialSettings {
        &self.inner.settings
    }

    fn provider(&self) -> Arc<dyn MaterialProvider> {
        Arc::clone(&self.inner) as Arc<dyn MaterialProvider>
    }
}

fn load_snapshot(
    loader: &dyn Loader,
    generation: u64,
    crypto: &Arc<CryptoProvider>,
) -> Result<MaterialSnapshot> {
    let raw = loader.load()?;
    build_material(&raw, generation, crypto)
}

impl CredentialSource for DynamicCredentials {
    fn tls_config(&self) -> Result<TlsClientConfig> {
        let cfg = dynamic_client_config(
            &self.provider(),
            self.inner.server_name.clone(),
            Arc::clone(&self.inner.crypto),
            self.inner.settings.alpn_protocols.clone(),
        )?;
        Ok(TlsClientConfig::new(
            Arc::new(cfg),
            self.inner.server_name.clone(),
        ))
    }

    fn ssh_config(&self) -> Result<SshClientConfig> {
        let provider = self.provider();
        let auth: SignersCallback = Arc::new(move || -> Result<Vec<CertSigner>> {
            let snap = provider.current_material();
            let signer = CertSigner::new(
                Arc::clone(&snap.ssh_certificate),
                Arc::clone(&snap.ssh_private_key),
            )
            .inspect_err(|e| {
                error!("ssh signer for generation {}: {e}", snap.generation);
            })?;
            Ok(vec![signer])
        });

        let provider = self.provider();
        let host_key_callback: HostKeyCallback = Arc::new(move |host: &str, key: &HostKey| {
            let snap = provider.current_material();
            snap.ssh_known_hosts.check(host, key, ssh::unix_now())
        });

        Ok(SshClientConfig::new(
            self.inner.settings.ssh_principal.clone(),
            self.inner.settings.ssh_timeout,
            auth,
            host_key_callback,
        ))
    }
}

/// Builder for [`DynamicCredentials`].
pub struct DynamicCredentialsBuilder {
    loader: Box<dyn Loader>,
    settings: CredentialSettings,
    crypto: Option<Arc<CryptoProvider>>,
}

impl fmt::Debug for DynamicCredentialsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCredentialsBuilder")
            .field("loader", &"<dyn Loader>")
            .field("settings", &self.settings)
            .field("crypto", &self.crypto.as_ref().map(|_| "<CryptoProvider>"))
            .finish()
    }
}

impl DynamicCredentialsBuilder {
    fn new(loader: Box<dyn Loader>) -> Self {
        Self {
            loader,
            settings: CredentialSettings::default(),
            crypto: None,
        }
    }

    /// Replaces all settings.
    #[must_use]
    pub fn settings(mut self, settings: CredentialSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the sentinel server name.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.settings.server_name = name.into();
        self
    }

    /// Sets the SSH principal.
    #[must_use]
    pub fn ssh_principal(mut self, principal: impl Into<String>) -> Self {
        self.settings.ssh_principal = principal.into();
        self
    }

    /// Sets the SSH I/O timeout.
    #[must_use]
    pub fn ssh_timeout(mut self, timeout: Duration) -> Self {
        self.settings.ssh_timeout = timeout;
        self
    }

    /// Sets the ALPN protocols, most preferred first.
    #[must_use]
    pub fn alpn_protocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        self.settings.alpn_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Uses `crypto` instead of the process-default rustls provider.
    #[must_use]
    pub fn crypto_provider(mut self, crypto: Arc<CryptoProvider>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Validates the settings and performs the initial load.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidSettings`] for unusable settings, or the
    /// error of the initial load.
    pub fn build(self) -> Result<DynamicCredentials> {
        self.settings.validate()?;
        let server_name = self.settings.sentinel_server_name()?;
        let crypto = self.crypto.unwrap_or_else(default_provider);

        let snapshot = load_snapshot(self.loader.as_ref(), 1, &crypto).inspect_err(|e| {
            error!("initial credential load failed: {e}");
        })?;
        info!("credential material loaded; generation=1");

        Ok(DynamicCredentials {
            inner: Arc::new(Inner {
                loader: self.loader,
                settings: self.settings,
                server_name,
                crypto,
                reload_lock: Mutex::new(()),
                material: RwLock::new(Arc::new(snapshot)),
            }),
        })
    }
}
