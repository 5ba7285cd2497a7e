mod common;

use common::{fixture, material};
use identity_creds::{
    CredentialSource, DynamicCredentials, Error, HostKey, MemoryLoader, DEFAULT_SSH_PRINCIPAL,
};
use signature::Verifier;
use std::sync::Arc;
use zeroize::Zeroizing;

fn host_key(name: &str) -> HostKey {
    HostKey::from_openssh(std::str::from_utf8(&fixture(name)).unwrap()).unwrap()
}

#[test]
fn signer_authenticates_with_current_certificate() {
    let loader = Arc::new(MemoryLoader::new(material("a", "ca.pem")));
    let creds = DynamicCredentials::new(Arc::clone(&loader)).unwrap();
    let ssh = creds.ssh_config().unwrap();
    assert_eq!(ssh.user(), DEFAULT_SSH_PRINCIPAL);

    let challenge = b"session identifier and userauth request";
    let signer = ssh.signers().unwrap().remove(0);
    let sig = signer.sign(challenge).unwrap();

    let user_ca = ssh_key::PublicKey::from_openssh(
        std::str::from_utf8(&fixture("ssh_user_ca.pub")).unwrap().trim(),
    )
    .unwrap();
    let ca_fp = user_ca.fingerprint(ssh_key::HashAlg::Sha256);
    signer
        .certificate()
        .validate_at(1_800_000_000, [&ca_fp])
        .unwrap();
    let public = ssh_key::PublicKey::from(signer.certificate().public_key().clone());
    Verifier::verify(&public, challenge, &sig).unwrap();

    loader.replace(material("b", "ca.pem"));
    creds.reload().unwrap();

    let signer = ssh.signers().unwrap().remove(0);
    assert_eq!(signer.certificate().key_id(), "user-b");
}

#[test]
fn mismatched_ssh_material_fails_only_that_attempt() {
    let mut raw = material("a", "ca.pem");
    raw.ssh_private_key = Zeroizing::new(fixture("ssh_user_b"));
    let loader = Arc::new(MemoryLoader::new(raw));
    let creds = DynamicCredentials::new(Arc::clone(&loader)).unwrap();
    let ssh = creds.ssh_config().unwrap();

    assert!(matches!(ssh.signers().unwrap_err(), Error::Signing(_)));
    // TLS is unaffected
    creds.tls_config().unwrap();

    loader.replace(material("a", "ca.pem"));
    creds.reload().unwrap();
    assert_eq!(ssh.signers().unwrap().len(), 1);
}

#[test]
fn host_certificates_checked_against_current_known_hosts() {
    let loader = Arc::new(MemoryLoader::new(material("a", "ca.pem")));
    let creds = DynamicCredentials::new(Arc::clone(&loader)).unwrap();
    let ssh = creds.ssh_config().unwrap();

    let trusted = host_key("ssh_host-cert.pub");
    let rogue = host_key("ssh_rogue_host-cert.pub");

    ssh.check_host_key("10.0.0.7:3022", &trusted).unwrap();
    assert!(matches!(
        ssh.check_host_key("10.0.0.7:3022", &rogue).unwrap_err(),
        Error::Verification(_)
    ));

    let mut rotated = material("a", "ca.pem");
    rotated.ssh_known_hosts = fixture("known_hosts_other");
    loader.replace(rotated);
    creds.reload().unwrap();

    ssh.check_host_key("10.0.0.7:3022", &rogue).unwrap();
    assert!(ssh.check_host_key("10.0.0.7:3022", &trusted).is_err());
}

#[test]
fn plain_host_keys_need_a_matching_entry() {
    let mut raw = material("a", "ca.pem");
    raw.ssh_known_hosts = fixture("known_hosts_plain");
    let creds = DynamicCredentials::new(MemoryLoader::new(raw)).unwrap();
    let ssh = creds.ssh_config().unwrap();

    let key = host_key("ssh_host.pub");
    ssh.check_host_key("auth.cluster.local", &key).unwrap();
    assert!(ssh.check_host_key("elsewhere.cluster.local", &key).is_err());

    // No @cert-authority line, so no host certificate is trusted.
    assert!(ssh
        .check_host_key("auth.cluster.local", &host_key("ssh_host-cert.pub"))
        .is_err());
}
