//! TLS-ALPN-01 challenge store
//!
//! For each domain under validation a self-signed certificate carrying the
//! `acmeIdentifier` extension (SHA-256 of the key authorization) is kept
//! here until cleanup. The host's TLS certificate resolver serves it when a
//! client negotiates the `acme-tls/1` ALPN protocol.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rcgen::{CertificateParams, CustomExtension, KeyPair};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{ChallengeProvider, ProviderResult};
use crate::error::ProviderError;

/// ALPN protocol identifier used by TLS-ALPN-01 validation
pub const ACME_TLS_ALPN_PROTOCOL: &[u8] = b"acme-tls/1";

/// A generated challenge certificate
#[derive(Debug, Clone)]
pub struct TlsAlpnCertificate {
    /// Certificate in PEM form
    pub certificate_pem: String,
    /// Certificate in DER form
    pub certificate_der: Vec<u8>,
    /// Private key in PEM form
    pub private_key_pem: String,
}

/// Pending TLS-ALPN-01 challenge certificates keyed by domain
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct TlsAlpn01ChallengeStore {
    certificates: Arc<DashMap<String, TlsAlpnCertificate>>,
}

impl TlsAlpn01ChallengeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge certificate for a domain, if one is pending
    pub fn get_certificate(&self, domain: &str) -> Option<TlsAlpnCertificate> {
        self.certificates.get(domain).map(|c| c.clone())
    }

    /// Number of pending challenges
    pub fn pending_count(&self) -> usize {
        self.certificates.len()
    }
}

/// Build the self-signed challenge certificate for a domain
fn challenge_certificate(
    domain: &str,
    key_authorization: &str,
) -> ProviderResult<TlsAlpnCertificate> {
    let digest = Sha256::digest(key_authorization.as_bytes());

    let key_pair = KeyPair::generate().map_err(|e| ProviderError::Certificate(e.to_string()))?;
    let mut params = CertificateParams::new(vec![domain.to_string()])
        .map_err(|e| ProviderError::Certificate(e.to_string()))?;
    params
        .custom_extensions
        .push(CustomExtension::new_acme_identifier(digest.as_slice()));

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| ProviderError::Certificate(e.to_string()))?;

    Ok(TlsAlpnCertificate {
        certificate_pem: cert.pem(),
        certificate_der: cert.der().to_vec(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

#[async_trait]
impl ChallengeProvider for TlsAlpn01ChallengeStore {
    fn name(&self) -> &'static str {
        "tls-alpn-01"
    }

    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        let certificate = challenge_certificate(domain, key_authorization)?;
        debug!(domain = %domain, "Registering TLS-ALPN-01 challenge certificate");
        self.certificates.insert(domain.to_string(), certificate);
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        _token: &str,
        _key_authorization: &str,
    ) -> ProviderResult<()> {
        if self.certificates.remove(domain).is_some() {
            debug!(domain = %domain, "Removed TLS-ALPN-01 challenge certificate");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// DER encoding of id-pe-acmeIdentifier (1.3.6.1.5.5.7.1.31)
    const ACME_IDENTIFIER_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x01, 0x1f];

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_present_generates_certificate() {
        let store = TlsAlpn01ChallengeStore::new();

        store
            .present("example.com", "token", "token.thumbprint")
            .await
            .unwrap();

        let cert = store.get_certificate("example.com").unwrap();
        assert!(cert.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(cert.private_key_pem.contains("PRIVATE KEY"));
        assert!(contains(&cert.certificate_der, ACME_IDENTIFIER_OID));

        let digest = Sha256::digest(b"token.thumbprint");
        assert!(contains(&cert.certificate_der, digest.as_slice()));
        assert!(contains(&cert.certificate_der, b"example.com"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_certificate() {
        let store = TlsAlpn01ChallengeStore::new();

        store.present("example.com", "t", "t.k").await.unwrap();
        assert_eq!(store.pending_count(), 1);

        store.cleanup("example.com", "t", "t.k").await.unwrap();
        assert_eq!(store.pending_count(), 0);
        assert!(store.get_certificate("example.com").is_none());
    }

    #[test]
    fn test_alpn_protocol() {
        assert_eq!(ACME_TLS_ALPN_PROTOCOL, b"acme-tls/1");
    }
}
