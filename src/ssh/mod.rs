//! SSH client authentication with OpenSSH certificates.
//!
//! Built on `ssh-key` types only; wiring into a particular SSH transport is
//! left to the caller.

mod config;
mod known_hosts;
mod signer;

pub use config::{HostKeyCallback, SignersCallback, SshClientConfig};
pub use known_hosts::{HostKey, KnownHosts};
pub use signer::CertSigner;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as used for certificate validity checks.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
