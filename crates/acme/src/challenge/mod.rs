//! Challenge backends
//!
//! Every challenge type is solved by a [`ChallengeProvider`]: DNS-01
//! providers come from the [`crate::dns`] registry, HTTP-01 and TLS-ALPN-01
//! providers are handed out by the host through [`ChallengeHost`].

mod http01;
mod tls_alpn01;

pub use http01::{Http01ChallengeStore, ACME_CHALLENGE_PREFIX};
pub use tls_alpn01::{TlsAlpn01ChallengeStore, TlsAlpnCertificate, ACME_TLS_ALPN_PROTOCOL};

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;

/// Result type for challenge backend operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// ACME domain validation mechanisms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    Dns01,
    Http01,
    TlsAlpn01,
}

impl ChallengeKind {
    /// Protocol name of the challenge type
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Dns01 => "dns-01",
            ChallengeKind::Http01 => "http-01",
            ChallengeKind::TlsAlpn01 => "tls-alpn-01",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend able to satisfy one challenge type
///
/// Implementations must be thread-safe; the ACME session may present
/// challenges for several domains through the same backend.
#[async_trait]
pub trait ChallengeProvider: Send + Sync + Debug {
    /// Short backend name used in logs (e.g. "cloudflare")
    fn name(&self) -> &'static str;

    /// Make the challenge answer available for validation
    async fn present(&self, domain: &str, token: &str, key_authorization: &str)
        -> ProviderResult<()>;

    /// Remove the challenge answer after validation, successful or not
    async fn cleanup(&self, domain: &str, token: &str, key_authorization: &str)
        -> ProviderResult<()>;

    /// Propagation timeout and polling interval, when the backend needs
    /// something other than the session defaults
    fn timeout(&self) -> Option<(Duration, Duration)> {
        None
    }

    /// Pause between consecutive challenges when the backend must solve
    /// them one at a time
    fn sequence_interval(&self) -> Option<Duration> {
        None
    }
}

/// Host collaborator that supplies HTTP-01 and TLS-ALPN-01 backends
///
/// The host decides how challenge answers reach the network (a request
/// filter, a TLS certificate resolver); the orchestrator only asks for the
/// backends when the account enables those challenge types.
pub trait ChallengeHost: Send + Sync {
    /// Backend that serves `/.well-known/acme-challenge/<token>`
    fn http01_provider(&self) -> Arc<dyn ChallengeProvider>;

    /// Backend that serves `acme-tls/1` challenge certificates
    fn tls_alpn01_provider(&self) -> Arc<dyn ChallengeProvider>;
}

/// In-memory challenge stores shared with the host's serving paths
#[derive(Debug, Clone, Default)]
pub struct SharedChallengeStores {
    http01: Http01ChallengeStore,
    tls_alpn01: TlsAlpn01ChallengeStore,
}

impl SharedChallengeStores {
    /// Create empty stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Store consulted by the HTTP request filter
    pub fn http01(&self) -> &Http01ChallengeStore {
        &self.http01
    }

    /// Store consulted by the TLS certificate resolver
    pub fn tls_alpn01(&self) -> &TlsAlpn01ChallengeStore {
        &self.tls_alpn01
    }
}

impl ChallengeHost for SharedChallengeStores {
    fn http01_provider(&self) -> Arc<dyn ChallengeProvider> {
        Arc::new(self.http01.clone())
    }

    fn tls_alpn01_provider(&self) -> Arc<dyn ChallengeProvider> {
        Arc::new(self.tls_alpn01.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_kind_names() {
        assert_eq!(ChallengeKind::Dns01.to_string(), "dns-01");
        assert_eq!(ChallengeKind::Http01.to_string(), "http-01");
        assert_eq!(ChallengeKind::TlsAlpn01.to_string(), "tls-alpn-01");
    }

    #[tokio::test]
    async fn test_shared_stores_back_host_providers() {
        let stores = SharedChallengeStores::new();

        let http = stores.http01_provider();
        http.present("example.com", "tok", "tok.thumb").await.unwrap();
        assert_eq!(
            stores.http01().get_response("tok"),
            Some("tok.thumb".to_string())
        );

        let tls = stores.tls_alpn01_provider();
        assert_eq!(tls.name(), "tls-alpn-01");
        assert!(tls.timeout().is_none());
    }
}
