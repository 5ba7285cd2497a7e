//! Host key trust decisions backed by an OpenSSH `known_hosts` file.

use crate::error::{Error, Result};
use crate::material::ssh_certificate_error;
use crate::prelude::debug;
use ssh_key::certificate::CertType;
use ssh_key::known_hosts::{HostPatterns, Marker};
use glob::{MatchOptions, Pattern};
use ssh_key::{Certificate, Fingerprint, HashAlg, PublicKey};
use std::fmt;

/// A key presented by an SSH server during the handshake.
#[derive(Clone, Debug)]
pub enum HostKey {
    /// A bare public key.
    Key(PublicKey),
    /// An OpenSSH host certificate.
    Certificate(Box<Certificate>),
}

impl HostKey {
    /// Parses a host key or host certificate in OpenSSH single-line format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `line` is neither.
    pub fn from_openssh(line: &str) -> Result<Self> {
        let line = line.trim();
        let algorithm = line.split_whitespace().next().unwrap_or_default();
        if algorithm.ends_with("-cert-v01@openssh.com") {
            Certificate::from_openssh(line)
                .map(|c| Self::Certificate(Box::new(c)))
                .map_err(|e| ssh_certificate_error("ssh host key", e))
        } else {
            PublicKey::from_openssh(line)
                .map(Self::Key)
                .map_err(|e| Error::malformed("ssh host key", e))
        }
    }

    fn key_data(&self) -> &ssh_key::public::KeyData {
        match self {
            Self::Key(k) => k.key_data(),
            Self::Certificate(c) => c.public_key(),
        }
    }
}

impl From<PublicKey> for HostKey {
    fn from(key: PublicKey) -> Self {
        Self::Key(key)
    }
}

impl From<Certificate> for HostKey {
    fn from(cert: Certificate) -> Self {
        Self::Certificate(Box::new(cert))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryKind {
    Host,
    CertAuthority,
    Revoked,
}

#[derive(Clone)]
struct KnownHost {
    kind: EntryKind,
    patterns: Vec<HostPattern>,
    key: PublicKey,
}

/// One entry of an OpenSSH pattern list, e.g. `*.example.com` or `!bad.example.com`.
#[derive(Clone, Debug)]
struct HostPattern {
    negated: bool,
    pattern: Pattern,
}

impl HostPattern {
    /// Only `*` and `?` are wildcards in OpenSSH patterns, so the brackets of
    /// `[host]:port` entries are escaped before compiling.
    fn parse(raw: &str) -> std::result::Result<Self, glob::PatternError> {
        let (negated, raw) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let mut escaped = String::with_capacity(raw.len() + 8);
        for c in raw.chars() {
            match c {
                '[' => escaped.push_str("[[]"),
                ']' => escaped.push_str("[]]"),
                c => escaped.push(c),
            }
        }
        Ok(Self {
            negated,
            pattern: Pattern::new(&escaped)?,
        })
    }

    fn matches(&self, name: &str) -> bool {
        self.pattern.matches_with(name, MATCH_OPTIONS)
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Parsed `known_hosts` trust set.
///
/// Three entry kinds are understood:
///
/// - `@cert-authority`: host certificates signed by this key are trusted for
///   any host. The host patterns on the line are not consulted, because the
///   tunnel address a client dials is rarely the name in the certificate.
/// - `@revoked`: the key is rejected, whether presented directly, as the key
///   inside a certificate, or as the certificate's signing CA.
/// - unmarked: a plain host key, trusted when one of its patterns matches the host.
///
/// Hashed host names (`|1|...`) are kept but never match.
#[derive(Clone, Default)]
pub struct KnownHosts {
    entries: Vec<KnownHost>,
}

impl fmt::Debug for KnownHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownHosts")
            .field("entries", &self.entries.len())
            .field("cert_authorities", &self.cert_authorities().count())
            .finish()
    }
}

impl KnownHosts {
    /// Parses `known_hosts` contents. Blank lines and `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the text is not UTF-8 or a line does not parse.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| Error::malformed("ssh known hosts", e))?;

        let mut entries = Vec::new();
        for entry in ssh_key::known_hosts::KnownHosts::new(text) {
            let entry = entry.map_err(|e| Error::malformed("ssh known hosts", e))?;
            let kind = match entry.marker() {
                Some(Marker::CertAuthority) => EntryKind::CertAuthority,
                Some(Marker::Revoked) => EntryKind::Revoked,
                None => EntryKind::Host,
            };
            let patterns = match entry.host_patterns() {
                HostPatterns::Patterns(p) => p
                    .iter()
                    .map(|p| HostPattern::parse(p))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::malformed("ssh known hosts", e))?,
                HostPatterns::HashedName { .. } => Vec::new(),
            };
            entries.push(KnownHost {
                kind,
                patterns,
                key: entry.public_key().clone(),
            });
        }

        Ok(Self { entries })
    }

    /// Number of entries of any kind.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys marked `@cert-authority`.
    pub fn cert_authorities(&self) -> impl Iterator<Item = &PublicKey> {
        self.of_kind(EntryKind::CertAuthority)
    }

    fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &PublicKey> {
        self.entries
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| &e.key)
    }

    fn is_revoked(&self, key: &ssh_key::public::KeyData) -> bool {
        self.of_kind(EntryKind::Revoked).any(|k| k.key_data() == key)
    }

    /// Decides whether `key`, presented by `host`, is trusted at `unix_now`.
    ///
    /// `host` may carry a port (`host:port`, `[host]:port`). Certificates must
    /// be host certificates, valid at `unix_now`, and signed by a
    /// `@cert-authority` key. Plain keys must match an unmarked entry whose
    /// patterns match `host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] when the key is not trusted.
    pub fn check(&self, host: &str, key: &HostKey, unix_now: u64) -> Result<()> {
        if self.is_revoked(key.key_data()) {
            return Err(Error::Verification(format!(
                "host key for {host} is revoked"
            )));
        }

        match key {
            HostKey::Certificate(cert) => self.check_certificate(host, cert, unix_now),
            HostKey::Key(key) => self.check_plain_key(host, key),
        }
    }

    fn check_certificate(&self, host: &str, cert: &Certificate, unix_now: u64) -> Result<()> {
        if cert.cert_type() != CertType::Host {
            return Err(Error::Verification(format!(
                "{host} presented a user certificate as its host key"
            )));
        }
        if self.is_revoked(cert.signature_key()) {
            return Err(Error::Verification(format!(
                "host certificate for {host} is signed by a revoked authority"
            )));
        }

        let trusted: Vec<Fingerprint> = self
            .cert_authorities()
            .map(|k| k.fingerprint(HashAlg::Sha256))
            .collect();
        if trusted.is_empty() {
            return Err(Error::Verification(
                "no host certificate authorities are trusted".into(),
            ));
        }

        cert.validate_at(unix_now, &trusted).map_err(|e| {
            debug!("host certificate for {host} rejected: {e}");
            Error::Verification(format!("host certificate for {host}: {e}"))
        })
    }

    fn check_plain_key(&self, host: &str, key: &PublicKey) -> Result<()> {
        let name = lookup_name(host);
        let found = self.entries.iter().any(|e| {
            e.kind == EntryKind::Host
                && e.key.key_data() == key.key_data()
                && patterns_match(&e.patterns, &name)
        });
        if found {
            Ok(())
        } else {
            Err(Error::Verification(format!(
                "host key {} for {host} is not known",
                key.fingerprint(HashAlg::Sha256)
            )))
        }
    }
}

/// Name a `known_hosts` line would use for `host`: the bare host for port 22,
/// `[host]:port` otherwise.
fn lookup_name(host: &str) -> String {
    let (name, port) = if let Some(rest) = host.strip_prefix('[') {
        match rest.split_once("]:") {
            Some((name, port)) => (name, Some(port)),
            None => (rest.trim_end_matches(']'), None),
        }
    } else {
        match host.rsplit_once(':') {
            // More than one colon without brackets is a bare IPv6 address.
            Some((name, port)) if !name.contains(':') => (name, Some(port)),
            _ => (host, None),
        }
    };

    match port {
        None | Some("22") => name.to_ascii_lowercase(),
        Some(port) => format!("[{}]:{port}", name.to_ascii_lowercase()),
    }
}

/// OpenSSH pattern-list semantics: a negated match vetoes, otherwise any match wins.
fn patterns_match(patterns: &[HostPattern], name: &str) -> bool {
    let mut matched = false;
    for p in patterns {
        if p.matches(name) {
            if p.negated {
                return false;
            }
            matched = true;
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::tests::fixture;

    const VALID_AT: u64 = 1_800_000_000;

    fn known_hosts(name: &str) -> KnownHosts {
        KnownHosts::parse(&fixture(name)).unwrap()
    }

    fn host_key(name: &str) -> HostKey {
        HostKey::from_openssh(std::str::from_utf8(&fixture(name)).unwrap()).unwrap()
    }

    #[test]
    fn parses_cert_authority_line() {
        let kh = known_hosts("known_hosts");
        assert_eq!(kh.len(), 1);
        assert_eq!(kh.cert_authorities().count(), 1);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut text = b"# comment\n\n".to_vec();
        text.extend(fixture("known_hosts"));
        assert_eq!(KnownHosts::parse(&text).unwrap().len(), 1);
    }

    #[test]
    fn rejects_truncated_line() {
        let err = KnownHosts::parse(b"@cert-authority *").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn accepts_host_certificate_from_trusted_ca() {
        let kh = known_hosts("known_hosts");
        let key = host_key("ssh_host-cert.pub");
        kh.check("10.0.0.7:3022", &key, VALID_AT).unwrap();
    }

    #[test]
    fn rejects_host_certificate_from_other_ca() {
        let kh = known_hosts("known_hosts");
        let key = host_key("ssh_rogue_host-cert.pub");
        let err = kh.check("auth.cluster.local", &key, VALID_AT).unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[test]
    fn rejects_user_certificate_as_host_key() {
        let kh = known_hosts("known_hosts");
        let key = host_key("ssh_user_a-cert.pub");
        let err = kh.check("auth.cluster.local", &key, VALID_AT).unwrap_err();
        assert!(err.to_string().contains("user certificate"));
    }

    #[test]
    fn rejects_plain_key_when_only_cas_are_known() {
        let kh = known_hosts("known_hosts");
        let key = host_key("ssh_host.pub");
        assert!(kh.check("auth.cluster.local", &key, VALID_AT).is_err());
    }

    #[test]
    fn plain_key_must_match_host_pattern() {
        let kh = known_hosts("known_hosts_plain");
        let key = host_key("ssh_host.pub");

        kh.check("auth.cluster.local", &key, VALID_AT).unwrap();
        kh.check("auth.cluster.local:22", &key, VALID_AT).unwrap();
        assert!(kh.check("auth.cluster.local:3022", &key, VALID_AT).is_err());
        assert!(kh.check("other.cluster.local", &key, VALID_AT).is_err());
    }

    #[test]
    fn revoked_key_is_rejected() {
        let mut text = fixture("known_hosts_plain");
        let host_pub = fixture("ssh_host.pub");
        text.extend_from_slice(b"\n@revoked * ");
        text.extend_from_slice(&host_pub);

        let kh = KnownHosts::parse(&text).unwrap();
        let err = kh
            .check("auth.cluster.local", &host_key("ssh_host.pub"), VALID_AT)
            .unwrap_err();
        assert!(err.to_string().contains("revoked"));

        // the host certificate wraps the same key
        let err = kh
            .check("auth.cluster.local", &host_key("ssh_host-cert.pub"), VALID_AT)
            .unwrap_err();
        assert!(err.to_string().contains("revoked"));
    }

    #[test]
    fn lookup_name_forms() {
        assert_eq!(lookup_name("Host.Example"), "host.example");
        assert_eq!(lookup_name("host:22"), "host");
        assert_eq!(lookup_name("host:2222"), "[host]:2222");
        assert_eq!(lookup_name("[host]:2222"), "[host]:2222");
        assert_eq!(lookup_name("::1"), "::1");
        assert_eq!(lookup_name("[::1]:22"), "::1");
    }

    fn patterns(raw: &[&str]) -> Vec<HostPattern> {
        raw.iter().map(|p| HostPattern::parse(p).unwrap()).collect()
    }

    #[test]
    fn pattern_lists() {
        let pats = patterns(&["*.cluster.local", "!bad.cluster.local"]);
        assert!(patterns_match(&pats, "node-1.cluster.local"));
        assert!(!patterns_match(&pats, "bad.cluster.local"));
        assert!(!patterns_match(&pats, "cluster.local"));

        assert!(patterns_match(&patterns(&["node-?"]), "node-1"));
        assert!(!patterns_match(&patterns(&["node-?"]), "node-12"));
        assert!(patterns_match(&patterns(&["a*b*c"]), "axxbyyc"));
        assert!(patterns_match(&patterns(&["Node-*"]), "node-1"));
        assert!(!patterns_match(&[], "node-1"));
    }

    #[test]
    fn bracketed_port_entries_match_literally() {
        let pats = patterns(&["[auth.cluster.local]:3022"]);
        assert!(patterns_match(&pats, &lookup_name("auth.cluster.local:3022")));
        assert!(!patterns_match(&pats, &lookup_name("auth.cluster.local")));

        let pats = patterns(&["[*.cluster.local]:3022"]);
        assert!(patterns_match(&pats, "[node-1.cluster.local]:3022"));
        assert!(!patterns_match(&pats, "n"));
    }

    #[test]
    fn plain_key_on_non_default_port() {
        let mut text = b"[auth.cluster.local]:3022 ".to_vec();
        text.extend(fixture("ssh_host.pub"));
        let kh = KnownHosts::parse(&text).unwrap();
        let key = host_key("ssh_host.pub");

        kh.check("auth.cluster.local:3022", &key, VALID_AT).unwrap();
        kh.check("[auth.cluster.local]:3022", &key, VALID_AT).unwrap();
        assert!(kh.check("auth.cluster.local", &key, VALID_AT).is_err());
    }
}
