//! Certificate-backed SSH signers.

use crate::error::{Error, Result};
use signature::Signer;
use ssh_key::{Algorithm, Certificate, PrivateKey, Signature};
use std::fmt;
use std::sync::Arc;

/// Signs SSH authentication challenges with a private key and presents the
/// matching OpenSSH user certificate.
///
/// Built fresh for each authentication attempt from the material generation
/// current at that moment.
#[derive(Clone)]
pub struct CertSigner {
    certificate: Arc<Certificate>,
    private_key: Arc<PrivateKey>,
}

impl fmt::Debug for CertSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertSigner")
            .field("key_id", &self.certificate.key_id())
            .field("algorithm", &self.certificate.algorithm())
            .finish_non_exhaustive()
    }
}

impl CertSigner {
    /// Pairs `certificate` with `private_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the key is encrypted or is not the key the
    /// certificate was issued for.
    pub fn new(certificate: Arc<Certificate>, private_key: Arc<PrivateKey>) -> Result<Self> {
        if private_key.is_encrypted() {
            return Err(Error::Signing("private key is encrypted".into()));
        }
        if certificate.public_key() != private_key.public_key().key_data() {
            return Err(Error::Signing(format!(
                "private key does not match certificate {:?}",
                certificate.key_id()
            )));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// The certificate presented to the server.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Signature algorithm of the underlying key.
    pub fn algorithm(&self) -> Algorithm {
        self.private_key.algorithm()
    }

    /// Signs `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the key fails to sign.
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.private_key
            .try_sign(data)
            .map_err(|e| Error::Signing(e.to_string()))
    }
}
