//! Tokio TLS connector bound to a credential source's sentinel server name.

use crate::error::{Error, Result};
use crate::tls::TlsClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector as TokioTlsConnector;

/// Wraps [`tokio_rustls::TlsConnector`] so every connection uses the sentinel
/// server name instead of the address being dialed.
///
/// # Example
///
/// ```no_run
/// use identity_creds::{CredentialSource, DynamicCredentials, FileLoader, TlsConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let creds = DynamicCredentials::new(FileLoader::from_dir("/var/lib/agent/creds"))?;
/// let connector = TlsConnector::new(creds.tls_config()?);
///
/// let tls = connector.connect_addr("10.0.0.7:3025").await?;
/// # drop(tls);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TlsConnector {
    inner: TokioTlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsConnector {
    /// Creates a connector from a credential source's TLS config.
    pub fn new(config: TlsClientConfig) -> Self {
        Self::from(config)
    }

    /// Server name every connection is made with.
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Performs a TLS handshake over `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the handshake fails, including when the
    /// server certificate is rejected.
    pub async fn connect<IO>(&self, stream: IO) -> Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        self.inner
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(Error::Connect)
    }

    /// Opens a TCP connection to `addr`, then performs a TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the TCP connection or the handshake fails.
    pub async fn connect_addr(&self, addr: impl ToSocketAddrs) -> Result<TlsStream<TcpStream>> {
        let stream = TcpStream::connect(addr).await.map_err(Error::Connect)?;
        self.connect(stream).await
    }
}

impl From<TlsClientConfig> for TlsConnector {
    fn from(config: TlsClientConfig) -> Self {
        let (config, server_name) = config.into_parts();
        Self {
            inner: TokioTlsConnector::from(config),
            server_name,
        }
    }
}
