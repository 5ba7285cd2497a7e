//! Loaders turn a stored reference (paths, an in-memory blob) into raw credential material.
//!
//! A loader only reads bytes. Parsing happens when the provider builds a
//! material generation, so loader failures are always [`Error::Unavailable`]
//! and parse failures are always [`Error::Malformed`].

use crate::error::{Error, Result};
use crate::sync::{self, Mutex};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Raw, unparsed credential material.
///
/// Private keys are zeroized on drop.
#[derive(Clone, Default)]
pub struct RawMaterial {
    /// Client certificate chain in PEM, leaf first.
    pub tls_cert_chain_pem: Vec<u8>,
    /// Private key matching the client certificate, in PEM (PKCS#8, PKCS#1 or SEC1).
    pub tls_private_key_pem: Zeroizing<Vec<u8>>,
    /// Trusted root certificates in PEM. Each entry may hold several certificates.
    pub tls_roots_pem: Vec<Vec<u8>>,
    /// OpenSSH user certificate (`*-cert.pub` contents).
    pub ssh_certificate: Vec<u8>,
    /// OpenSSH private key matching the SSH certificate.
    pub ssh_private_key: Zeroizing<Vec<u8>>,
    /// OpenSSH `known_hosts` contents.
    pub ssh_known_hosts: Vec<u8>,
}

impl fmt::Debug for RawMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMaterial")
            .field("tls_cert_chain_pem", &self.tls_cert_chain_pem.len())
            .field("tls_private_key_pem", &"<redacted>")
            .field("tls_roots_pem", &self.tls_roots_pem.len())
            .field("ssh_certificate", &self.ssh_certificate.len())
            .field("ssh_private_key", &"<redacted>")
            .field("ssh_known_hosts", &self.ssh_known_hosts.len())
            .finish()
    }
}

/// Produces raw credential material from a reference the loader holds.
///
/// Called once at provider construction and again on every reload. It may
/// block on I/O; the provider never calls it while holding its material lock.
pub trait Loader: Send + Sync + 'static {
    /// Reads the current material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the material cannot be read.
    fn load(&self) -> Result<RawMaterial>;
}

impl<L: Loader + ?Sized> Loader for Arc<L> {
    fn load(&self) -> Result<RawMaterial> {
        (**self).load()
    }
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn load(&self) -> Result<RawMaterial> {
        (**self).load()
    }
}

/// Locations of each piece of material on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePaths {
    /// Client certificate chain (PEM).
    pub tls_cert: PathBuf,
    /// Client private key (PEM).
    pub tls_key: PathBuf,
    /// Trusted roots (PEM).
    pub tls_roots: PathBuf,
    /// SSH user certificate.
    pub ssh_cert: PathBuf,
    /// SSH private key (OpenSSH format).
    pub ssh_key: PathBuf,
    /// SSH known hosts.
    pub ssh_known_hosts: PathBuf,
}

impl FilePaths {
    /// File name of the client certificate chain inside a credentials directory.
    pub const TLS_CERT: &'static str = "tls.crt";
    /// File name of the client private key inside a credentials directory.
    pub const TLS_KEY: &'static str = "tls.key";
    /// File name of the trusted roots inside a credentials directory.
    pub const TLS_ROOTS: &'static str = "tls-ca.crt";
    /// File name of the SSH certificate inside a credentials directory.
    pub const SSH_CERT: &'static str = "ssh-cert.pub";
    /// File name of the SSH private key inside a credentials directory.
    pub const SSH_KEY: &'static str = "ssh.key";
    /// File name of the known hosts file inside a credentials directory.
    pub const SSH_KNOWN_HOSTS: &'static str = "known_hosts";

    /// Conventional layout of a credentials directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            tls_cert: dir.join(Self::TLS_CERT),
            tls_key: dir.join(Self::TLS_KEY),
            tls_roots: dir.join(Self::TLS_ROOTS),
            ssh_cert: dir.join(Self::SSH_CERT),
            ssh_key: dir.join(Self::SSH_KEY),
            ssh_known_hosts: dir.join(Self::SSH_KNOWN_HOSTS),
        }
    }
}

/// Reads material from files on every load.
#[derive(Clone, Debug)]
pub struct FileLoader {
    paths: FilePaths,
}

impl FileLoader {
    /// Creates a loader for explicit file locations.
    pub fn new(paths: FilePaths) -> Self {
        Self { paths }
    }

    /// Creates a loader for a directory laid out as described by [`FilePaths::in_dir`].
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(FilePaths::in_dir(dir))
    }

    /// Returns the file locations this loader reads.
    pub fn paths(&self) -> &FilePaths {
        &self.paths
    }
}

pub(crate) fn read_file(what: &'static str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::unavailable_at(what, path, e))
}

impl Loader for FileLoader {
    fn load(&self) -> Result<RawMaterial> {
        let p = &self.paths;
        Ok(RawMaterial {
            tls_cert_chain_pem: read_file("tls certificate", &p.tls_cert)?,
            tls_private_key_pem: Zeroizing::new(read_file("tls private key", &p.tls_key)?),
            tls_roots_pem: vec![read_file("tls root certificates", &p.tls_roots)?],
            ssh_certificate: read_file("ssh certificate", &p.ssh_cert)?,
            ssh_private_key: Zeroizing::new(read_file("ssh private key", &p.ssh_key)?),
            ssh_known_hosts: read_file("ssh known hosts", &p.ssh_known_hosts)?,
        })
    }
}

/// Serves material held in memory.
///
/// The blob can be swapped with [`MemoryLoader::replace`]; the next reload of
/// a provider using this loader picks it up. Keep an `Arc<MemoryLoader>` to
/// replace material after handing the loader to a provider.
pub struct MemoryLoader {
    material: Mutex<RawMaterial>,
}

impl fmt::Debug for MemoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLoader").finish_non_exhaustive()
    }
}

impl MemoryLoader {
    /// Creates a loader serving `material`.
    pub fn new(material: RawMaterial) -> Self {
        Self {
            material: Mutex::new(material),
        }
    }

    /// Replaces the served material, returning the previous blob.
    pub fn replace(&self, material: RawMaterial) -> RawMaterial {
        std::mem::replace(&mut *sync::lock(&self.material), material)
    }
}

impl Loader for MemoryLoader {
    fn load(&self) -> Result<RawMaterial> {
        Ok(sync::lock(&self.material).clone())
    }
}
