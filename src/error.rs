//! Error types for `identity-creds`.

use std::path::PathBuf;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by `identity-creds`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Backing material could not be read.
    ///
    /// Returned by loaders (and therefore by reloads and construction) when the
    /// referenced material is missing or the read fails.
    #[error("{what} is unavailable{}: {source}", display_path(.path.as_ref()))]
    Unavailable {
        /// Which piece of material was being read.
        what: &'static str,
        /// Path of the backing file, when the material lives on disk.
        path: Option<PathBuf>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Backing material was read but is not valid certificate, key, or host key data.
    #[error("{what} is malformed: {reason}")]
    Malformed {
        /// Which piece of material failed to parse.
        what: &'static str,
        /// Parser diagnostic.
        reason: String,
    },

    /// An SSH signer could not be built from the current material, or signing failed.
    ///
    /// Only the authentication attempt that hit it is affected.
    #[error("ssh signing failed: {0}")]
    Signing(String),

    /// The peer's certificate or host key did not verify against the current trust material.
    #[error("peer verification failed: {0}")]
    Verification(String),

    /// The credential source does not provide the requested configuration.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A provider or source setting is unusable.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A rustls error occurred.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),

    /// Connecting or completing the TLS handshake failed.
    #[cfg(feature = "tokio")]
    #[error("tls connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

fn display_path(path: Option<&PathBuf>) -> String {
    path.map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

impl Error {
    /// Builds an [`Error::Unavailable`] without a path, for [`crate::Loader`]
    /// implementations whose material does not live on disk.
    pub fn unavailable(what: &'static str, source: std::io::Error) -> Self {
        Self::Unavailable {
            what,
            path: None,
            source,
        }
    }

    pub(crate) fn unavailable_at(
        what: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Unavailable {
            what,
            path: Some(path.into()),
            source,
        }
    }

    pub(crate) fn malformed(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            what,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error means the material could not be read.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns `true` if the error means the material was read but failed to parse.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}
