use rustls::crypto::CryptoProvider;
use std::sync::{Arc, OnceLock};

/// Installs the selected rustls crypto provider as the process default.
///
/// Idempotent. If the application (or another crate) already installed a
/// provider, that one is kept.
pub(crate) fn ensure_crypto_provider_installed() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = selected_provider().install_default();
    });
}

/// Returns the process-default provider, installing ours first if needed.
pub(crate) fn default_provider() -> Arc<CryptoProvider> {
    ensure_crypto_provider_installed();
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(selected_provider()))
}

#[cfg(feature = "ring")]
fn selected_provider() -> CryptoProvider {
    rustls::crypto::ring::default_provider()
}

#[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
fn selected_provider() -> CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}
