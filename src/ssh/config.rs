//! Transport-independent SSH client configuration.

use crate::error::Result;
use crate::ssh::{CertSigner, HostKey};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Produces the signers offered for one authentication attempt.
pub type SignersCallback = Arc<dyn Fn() -> Result<Vec<CertSigner>> + Send + Sync + 'static>;

/// Decides whether a server's host key is trusted. Receives the dialed host
/// (optionally with a port) and the presented key.
pub type HostKeyCallback = Arc<dyn Fn(&str, &HostKey) -> Result<()> + Send + Sync + 'static>;

/// SSH client configuration produced by a credential source.
///
/// Independent of any SSH transport. An integration calls [`signers`] when
/// the server asks for public key authentication and [`check_host_key`] when
/// the server presents its host key. Both consult the provider's material at
/// call time, so one config stays valid across reloads.
///
/// [`signers`]: SshClientConfig::signers
/// [`check_host_key`]: SshClientConfig::check_host_key
#[derive(Clone)]
pub struct SshClientConfig {
    user: String,
    timeout: Duration,
    auth: SignersCallback,
    host_key_callback: HostKeyCallback,
}

impl fmt::Debug for SshClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshClientConfig")
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SshClientConfig {
    /// Assembles a config from its parts.
    pub fn new(
        user: impl Into<String>,
        timeout: Duration,
        auth: SignersCallback,
        host_key_callback: HostKeyCallback,
    ) -> Self {
        Self {
            user: user.into(),
            timeout,
            auth,
            host_key_callback,
        }
    }

    /// Principal to authenticate as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// I/O timeout for the SSH handshake.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Signers for the current authentication attempt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Signing`] if no signer can be built from the
    /// current material. Later attempts are unaffected.
    pub fn signers(&self) -> Result<Vec<CertSigner>> {
        (self.auth)()
    }

    /// Checks the host key presented by `host`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Verification`] if the key is not trusted.
    pub fn check_host_key(&self, host: &str, key: &HostKey) -> Result<()> {
        (self.host_key_callback)(host, key)
    }
}
