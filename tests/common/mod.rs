#![allow(dead_code)]

use identity_creds::RawMaterial;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use zeroize::Zeroizing;

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap()
}

pub fn certs(name: &str) -> Vec<CertificateDer<'static>> {
    rustls_pemfile::certs(&mut fixture(name).as_slice())
        .collect::<Result<_, _>>()
        .unwrap()
}

pub fn key(name: &str) -> PrivateKeyDer<'static> {
    rustls_pemfile::private_key(&mut fixture(name).as_slice())
        .unwrap()
        .unwrap()
}

/// Material for identity `a` or `b` trusting `roots`.
pub fn material(identity: &str, roots: &str) -> RawMaterial {
    RawMaterial {
        tls_cert_chain_pem: fixture(&format!("client_{identity}.pem")),
        tls_private_key_pem: Zeroizing::new(fixture(&format!("client_{identity}.key"))),
        tls_roots_pem: vec![fixture(roots)],
        ssh_certificate: fixture(&format!("ssh_user_{identity}-cert.pub")),
        ssh_private_key: Zeroizing::new(fixture(&format!("ssh_user_{identity}"))),
        ssh_known_hosts: fixture("known_hosts"),
    }
}

#[cfg(feature = "ring")]
pub fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

#[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
pub fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Server requiring a client certificate issued by `ca.pem`.
///
/// `server` names a fixture pair (`<server>.pem`, `<server>.key`); `chain`
/// lists extra certificates sent after the leaf.
pub fn server_config(server: &str, chain: &[&str], alpn: &[&[u8]]) -> Arc<ServerConfig> {
    let mut client_roots = RootCertStore::empty();
    for c in certs("ca.pem") {
        client_roots.add(c).unwrap();
    }
    let client_verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(client_roots), provider())
            .build()
            .unwrap();

    let mut cert_chain = certs(&format!("{server}.pem"));
    for c in chain {
        cert_chain.extend(certs(c));
    }

    let mut cfg = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain, key(&format!("{server}.key")))
        .unwrap();
    cfg.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Arc::new(cfg)
}

/// Outcome of one in-memory handshake.
#[derive(Debug)]
pub struct Handshake {
    /// Client certificate chain the server received.
    pub client_chain: Vec<CertificateDer<'static>>,
    /// ALPN protocol the client negotiated.
    pub alpn: Option<Vec<u8>>,
}

/// Runs a handshake over an in-memory duplex pipe.
///
/// Returns the client-side error if either side fails.
pub async fn handshake(
    client: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    server: Arc<ServerConfig>,
) -> Result<Handshake, std::io::Error> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);

    let acceptor = TlsAcceptor::from(server);
    let connector = TlsConnector::from(client);

    let (server_res, client_res) = tokio::join!(
        acceptor.accept(server_io),
        connector.connect(server_name, client_io)
    );

    let client_tls = client_res?;
    let server_tls = server_res?;

    let client_chain = server_tls
        .get_ref()
        .1
        .peer_certificates()
        .map(|c| c.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();
    let alpn = client_tls.get_ref().1.alpn_protocol().map(<[u8]>::to_vec);

    Ok(Handshake { client_chain, alpn })
}
