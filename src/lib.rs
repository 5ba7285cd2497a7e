#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # identity-creds
//!
//! Client credentials for agents that join a cluster over mutually
//! authenticated TLS and SSH, with material that can be swapped at runtime.
//!
//! A [`CredentialSource`] hands out a [`TlsClientConfig`] and an
//! [`SshClientConfig`]. [`DynamicCredentials`] is the source whose material
//! comes from a [`Loader`] and can be replaced with
//! [`DynamicCredentials::reload`]: configs handed out earlier pick up the new
//! certificate, roots, SSH certificate and known hosts on their next
//! handshake. A failed reload leaves the previous material in place.
//!
//! Servers are verified against a fixed sentinel server name rather than the
//! address being dialed, since agents usually reach the cluster through
//! tunnels and proxies (see [`CredentialSettings`]).
//!
//! ```no_run
//! use identity_creds::{CredentialSource, DynamicCredentials, FileLoader};
//!
//! # fn example() -> Result<(), identity_creds::Error> {
//! let creds = DynamicCredentials::new(FileLoader::from_dir("/var/lib/agent/creds"))?;
//!
//! let tls = creds.tls_config()?;
//! let ssh = creds.ssh_config()?;
//! let signers = ssh.signers()?;
//! # drop((tls, signers));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! Exactly **one** `rustls` crypto provider must be enabled:
//!
//! * `ring` (default)
//! * `aws-lc-rs`
//!
//! Enabling more than one provider results in a compile-time error.
//!
//! * `logging` (default): log through the `log` crate
//! * `tracing`: log through `tracing` instead
//! * `parking-lot`: use `parking_lot` locks
//! * `tokio`: [`TlsConnector`] for `tokio` streams

#[cfg(all(feature = "ring", feature = "aws-lc-rs"))]
compile_error!("Enable only one crypto provider feature: `ring` or `aws-lc-rs`.");

#[cfg(not(any(feature = "ring", feature = "aws-lc-rs")))]
compile_error!("Enable one crypto provider feature: `ring` (default) or `aws-lc-rs`.");

pub mod ssh;

mod crypto;
mod error;
mod loader;
mod material;
mod settings;
mod sync;

mod observability;
mod prelude;

mod dynamic;
mod source;
mod tls;
mod verifier;

#[cfg(feature = "tokio")]
mod connector;

pub use dynamic::{DynamicCredentials, DynamicCredentialsBuilder};
pub use error::{Error, Result};
pub use loader::{FileLoader, FilePaths, Loader, MemoryLoader, RawMaterial};
pub use settings::{
    CredentialSettings, DEFAULT_ALPN_PROTOCOL, DEFAULT_SERVER_NAME, DEFAULT_SSH_PRINCIPAL,
    DEFAULT_SSH_TIMEOUT,
};
pub use source::{CredentialSource, KeyPairCredentials, StaticTlsCredentials};
pub use ssh::{CertSigner, HostKey, KnownHosts, SshClientConfig};
pub use tls::TlsClientConfig;

#[cfg(feature = "tokio")]
pub use connector::TlsConnector;
