mod common;

use common::{certs, fixture_path, handshake, server_config};
use identity_creds::{
    CredentialSource, DynamicCredentials, FileLoader, FilePaths, KeyPairCredentials,
};
use std::path::Path;
use tempfile::TempDir;

fn install(dir: &Path, identity: &str) {
    let copy = |from: String, to: &str| {
        std::fs::copy(fixture_path(&from), dir.join(to)).unwrap();
    };
    copy(format!("client_{identity}.pem"), FilePaths::TLS_CERT);
    copy(format!("client_{identity}.key"), FilePaths::TLS_KEY);
    copy("ca.pem".into(), FilePaths::TLS_ROOTS);
    copy(format!("ssh_user_{identity}-cert.pub"), FilePaths::SSH_CERT);
    copy(format!("ssh_user_{identity}"), FilePaths::SSH_KEY);
    copy("known_hosts".into(), FilePaths::SSH_KNOWN_HOSTS);
}

#[tokio::test]
async fn file_loader_reload_picks_up_renewed_files() {
    let dir = TempDir::new().unwrap();
    install(dir.path(), "a");

    let creds = DynamicCredentials::new(FileLoader::from_dir(dir.path())).unwrap();
    let (config, name) = creds.tls_config().unwrap().into_parts();
    let server = server_config("server", &[], &[]);

    let done = handshake(config.clone(), name.clone(), server.clone())
        .await
        .unwrap();
    assert_eq!(done.client_chain[0], certs("client_a.pem")[0]);

    install(dir.path(), "b");
    // Files changed on disk, but nothing changes until a reload.
    let done = handshake(config.clone(), name.clone(), server.clone())
        .await
        .unwrap();
    assert_eq!(done.client_chain[0], certs("client_a.pem")[0]);

    creds.reload().unwrap();
    let done = handshake(config, name, server).await.unwrap();
    assert_eq!(done.client_chain[0], certs("client_b.pem")[0]);
}

#[test]
fn file_loader_missing_piece_is_unavailable_and_keeps_material() {
    let dir = TempDir::new().unwrap();
    install(dir.path(), "a");
    let creds = DynamicCredentials::new(FileLoader::from_dir(dir.path())).unwrap();

    std::fs::remove_file(dir.path().join(FilePaths::SSH_KNOWN_HOSTS)).unwrap();
    let err = creds.reload().unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.to_string().contains(FilePaths::SSH_KNOWN_HOSTS));
    assert_eq!(creds.generation(), 1);
}

#[tokio::test]
async fn key_pair_credentials_read_files_per_call() {
    let dir = TempDir::new().unwrap();
    install(dir.path(), "a");

    let creds = KeyPairCredentials::new(
        dir.path().join(FilePaths::TLS_CERT),
        dir.path().join(FilePaths::TLS_KEY),
        dir.path().join(FilePaths::TLS_ROOTS),
    );
    let server = server_config("server", &[], &[b"h2"]);

    let (config, name) = creds.tls_config().unwrap().into_parts();
    assert_eq!(name.to_str(), "auth.cluster.local");
    let done = handshake(config, name, server.clone()).await.unwrap();
    assert_eq!(done.client_chain[0], certs("client_a.pem")[0]);
    assert_eq!(done.alpn.as_deref(), Some(&b"h2"[..]));

    install(dir.path(), "b");
    let (config, name) = creds.tls_config().unwrap().into_parts();
    let done = handshake(config, name, server).await.unwrap();
    assert_eq!(done.client_chain[0], certs("client_b.pem")[0]);
}
