//! Settings shared by every credential source.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Default sentinel server name.
///
/// Sent as SNI and used as the DNS name during server certificate
/// verification. Every server certificate issued by the cluster carries it,
/// so it stands in for the real host name, which is often unknown until the
/// connection is established.
pub const DEFAULT_SERVER_NAME: &str = "auth.cluster.local";

/// Default SSH principal presented during the SSH handshake.
///
/// It must be stable across every certificate issued to a user; the server
/// makes its authorization decision from the certificate, not from this name.
pub const DEFAULT_SSH_PRINCIPAL: &str = "-internal-join";

/// Default ALPN protocol (`h2`).
pub const DEFAULT_ALPN_PROTOCOL: &[u8] = b"h2";

/// Default SSH I/O timeout.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Sentinel names, negotiation and timeout settings applied to generated configs.
///
/// The values are defined by the surrounding protocol, not by this crate, so
/// they are configurable. `CredentialSettings` can be embedded in an
/// application config file. ALPN protocols are given as strings and the SSH
/// timeout in whole seconds; missing fields keep their defaults:
///
/// ```rust
/// use identity_creds::CredentialSettings;
/// use std::time::Duration;
///
/// let settings: CredentialSettings = serde_json::from_str(
///     r#"{ "server_name": "auth.example.internal", "alpn_protocols": ["h2"], "ssh_timeout": 10 }"#,
/// )?;
/// assert_eq!(settings.server_name, "auth.example.internal");
/// assert_eq!(settings.alpn_protocols, vec![b"h2".to_vec()]);
/// assert_eq!(settings.ssh_timeout, Duration::from_secs(10));
/// assert_eq!(settings.ssh_principal, identity_creds::DEFAULT_SSH_PRINCIPAL);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Sentinel server name for SNI and certificate verification.
    pub server_name: String,
    /// SSH principal (user name) presented during the SSH handshake.
    pub ssh_principal: String,
    /// ALPN protocols, most preferred first.
    #[serde(deserialize_with = "alpn_from_strings")]
    pub alpn_protocols: Vec<Vec<u8>>,
    /// SSH I/O timeout. Deserialized from whole seconds.
    #[serde(deserialize_with = "duration_from_secs")]
    pub ssh_timeout: Duration,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            ssh_principal: DEFAULT_SSH_PRINCIPAL.to_owned(),
            alpn_protocols: vec![DEFAULT_ALPN_PROTOCOL.to_vec()],
            ssh_timeout: DEFAULT_SSH_TIMEOUT,
        }
    }
}

impl CredentialSettings {
    /// Parses [`Self::server_name`] as a rustls `ServerName`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] if the name is not a valid DNS name or IP address.
    pub fn sentinel_server_name(&self) -> Result<ServerName<'static>> {
        ServerName::try_from(self.server_name.clone()).map_err(|e| {
            Error::InvalidSettings(format!("server name {:?}: {e}", self.server_name))
        })
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] if the server name does not parse or
    /// the SSH principal is empty.
    pub fn validate(&self) -> Result<()> {
        self.sentinel_server_name()?;
        if self.ssh_principal.is_empty() {
            return Err(Error::InvalidSettings("ssh principal is empty".into()));
        }
        Ok(())
    }
}

fn alpn_from_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let protocols = Vec::<String>::deserialize(deserializer)?;
    Ok(protocols.into_iter().map(String::into_bytes).collect())
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Appends `protocols` to `existing`, dropping duplicates and keeping first-seen order.
pub(crate) fn merge_alpn(existing: &[Vec<u8>], protocols: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut out: Vec<Vec<u8>> = Vec::with_capacity(existing.len() + protocols.len());
    for p in existing.iter().chain(protocols) {
        if !out.contains(p) {
            out.push(p.clone());
        }
    }
    out
}
