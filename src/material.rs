//! Parsing of raw material into immutable generations.

use crate::error::{Error, Result};
use crate::loader::RawMaterial;
use crate::prelude::debug;
use crate::ssh::KnownHosts;
use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use std::fmt;
use std::sync::Arc;

/// One generation of parsed credential material.
///
/// Immutable once built. A reload builds a whole new snapshot and swaps the
/// pointer, so readers holding an `Arc<MaterialSnapshot>` always see the TLS
/// and SSH pieces of the same generation.
#[derive(Clone)]
pub(crate) struct MaterialSnapshot {
    pub generation: u64,
    pub certified_key: Arc<CertifiedKey>,
    pub roots: Arc<RootCertStore>,
    pub server_verifier: Arc<dyn ServerCertVerifier>,
    pub ssh_certificate: Arc<ssh_key::Certificate>,
    pub ssh_private_key: Arc<ssh_key::PrivateKey>,
    pub ssh_known_hosts: Arc<KnownHosts>,
}

impl fmt::Debug for MaterialSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterialSnapshot")
            .field("generation", &self.generation)
            .field("tls_chain_len", &self.certified_key.cert.len())
            .field("roots", &self.roots.len())
            .field("ssh_key_id", &self.ssh_certificate.key_id())
            .field("ssh_known_hosts", &self.ssh_known_hosts.len())
            .finish_non_exhaustive()
    }
}

/// Parses every piece of `raw` into a snapshot tagged with `generation`.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] naming the first piece that fails to parse.
/// Nothing is returned partially: either all pieces parse or none are used.
pub(crate) fn build_material(
    raw: &RawMaterial,
    generation: u64,
    provider: &Arc<CryptoProvider>,
) -> Result<MaterialSnapshot> {
    let chain = cert_chain_from_pem(&raw.tls_cert_chain_pem)?;
    let key = private_key_from_pem(&raw.tls_private_key_pem)?;
    let certified_key = certified_key(chain, key, provider)?;

    let roots = roots_from_pems(raw.tls_roots_pem.iter().map(Vec::as_slice))?;
    let server_verifier = server_verifier(Arc::clone(&roots), provider)?;

    let ssh_certificate = ssh_certificate_from_openssh(&raw.ssh_certificate)?;
    let ssh_private_key = ssh_private_key_from_openssh(&raw.ssh_private_key)?;
    let ssh_known_hosts = KnownHosts::parse(&raw.ssh_known_hosts)?;

    debug!(
        "parsed credential material: generation={generation}, roots={}, ssh_key_id={:?}, known_hosts={}",
        roots.len(),
        ssh_certificate.key_id(),
        ssh_known_hosts.len()
    );

    Ok(MaterialSnapshot {
        generation,
        certified_key,
        roots,
        server_verifier,
        ssh_certificate: Arc::new(ssh_certificate),
        ssh_private_key: Arc::new(ssh_private_key),
        ssh_known_hosts: Arc::new(ssh_known_hosts),
    })
}

/// Decodes a PEM certificate chain, leaf first.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if the PEM is invalid, holds no certificate,
/// or the leaf is not a parseable X.509 certificate.
pub(crate) fn cert_chain_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let chain = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::malformed("tls certificate", e))?;

    let leaf = chain
        .first()
        .ok_or_else(|| Error::malformed("tls certificate", "no certificate found in PEM"))?;

    let (_, parsed) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| Error::malformed("tls certificate", e))?;
    debug!(
        "client certificate subject={}, not_after={}",
        parsed.subject(),
        parsed.validity().not_after
    );

    Ok(chain)
}

/// Decodes the first private key (PKCS#8, PKCS#1 or SEC1) found in `pem`.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if the PEM is invalid or holds no private key.
pub(crate) fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| Error::malformed("tls private key", e))?
        .ok_or_else(|| Error::malformed("tls private key", "no private key found in PEM"))
}

/// Builds a rustls `CertifiedKey` and checks the key belongs to the leaf.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if the key cannot be loaded by the crypto
/// provider or does not match the leaf certificate.
pub(crate) fn certified_key(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    provider: &CryptoProvider,
) -> Result<Arc<CertifiedKey>> {
    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|e| Error::malformed("tls private key", e))?;

    let certified = CertifiedKey::new(chain, signing_key);
    match certified.keys_match() {
        Ok(()) => {}
        Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {
            debug!("signing key does not expose its public key; skipping key/certificate match");
        }
        Err(e) => return Err(Error::malformed("tls private key", e)),
    }

    Ok(Arc::new(certified))
}

/// Builds a root store from one or more PEM blobs.
///
/// Every blob must contribute at least one certificate, and every certificate
/// must be accepted as a trust anchor.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if any blob is invalid or empty, or no roots are supplied.
pub(crate) fn roots_from_pems<'a, I>(pems: I) -> Result<Arc<RootCertStore>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut store = RootCertStore::empty();

    for pem in pems {
        let certs = rustls_pemfile::certs(&mut &pem[..])
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::malformed("tls root certificates", e))?;
        if certs.is_empty() {
            return Err(Error::malformed(
                "tls root certificates",
                "invalid CA certificate PEM",
            ));
        }
        for cert in certs {
            store
                .add(cert)
                .map_err(|e| Error::malformed("tls root certificates", e))?;
        }
    }

    if store.is_empty() {
        return Err(Error::malformed(
            "tls root certificates",
            "no root certificates supplied",
        ));
    }

    debug!("loaded {} root certificate(s)", store.len());
    Ok(Arc::new(store))
}

/// Builds the chain verifier used for one generation of roots.
pub(crate) fn server_verifier(
    roots: Arc<RootCertStore>,
    provider: &Arc<CryptoProvider>,
) -> Result<Arc<dyn ServerCertVerifier>> {
    let v = WebPkiServerVerifier::builder_with_provider(roots, Arc::clone(provider))
        .build()
        .map_err(|e| Error::malformed("tls root certificates", e))?;
    Ok(v)
}

fn utf8<'a>(what: &'static str, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| Error::malformed(what, e))
}

/// Maps an `ssh-key` certificate parse error to [`Error::Malformed`].
///
/// `ssh-key` only accepts validity bounds up to `i64::MAX`, so certificates
/// issued without `-V` (valid "forever") are rejected with a dedicated reason.
pub(crate) fn ssh_certificate_error(what: &'static str, e: ssh_key::Error) -> Error {
    match e {
        ssh_key::Error::Time => Error::malformed(
            what,
            "validity period out of range (certificates valid forever are not supported)",
        ),
        e => Error::malformed(what, e),
    }
}

/// Parses an OpenSSH user certificate.
///
/// Certificates must carry a bounded validity window. Plain `ssh-keygen -s`
/// output is valid forever and is rejected; issue with `-V`.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if the text is not a certificate, not a user
/// certificate, or valid forever.
pub(crate) fn ssh_certificate_from_openssh(bytes: &[u8]) -> Result<ssh_key::Certificate> {
    let text = utf8("ssh certificate", bytes)?;
    let cert = ssh_key::Certificate::from_openssh(text.trim())
        .map_err(|e| ssh_certificate_error("ssh certificate", e))?;
    if cert.cert_type() != ssh_key::certificate::CertType::User {
        return Err(Error::malformed(
            "ssh certificate",
            "expected a user certificate",
        ));
    }
    Ok(cert)
}

/// Parses an unencrypted OpenSSH private key.
///
/// ## Errors
///
/// Returns [`Error::Malformed`] if the key does not parse or is passphrase protected.
pub(crate) fn ssh_private_key_from_openssh(bytes: &[u8]) -> Result<ssh_key::PrivateKey> {
    let key = ssh_key::PrivateKey::from_openssh(bytes)
        .map_err(|e| Error::malformed("ssh private key", e))?;
    if key.is_encrypted() {
        return Err(Error::malformed(
            "ssh private key",
            "passphrase protected keys are not supported",
        ));
    }
    Ok(key)
}
