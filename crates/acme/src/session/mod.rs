//! ACME session abstraction
//!
//! An [`AcmeSession`] is the per-acquisition protocol client: challenge
//! backends are registered on it first, then a single [`AcmeSession::obtain`]
//! call drives the order to a signed certificate. [`SessionProvider`] opens a
//! fresh session for every acquisition.

mod instant;

pub use instant::{AcmeAccount, InstantAcmeSession};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::challenge::ChallengeProvider;
use crate::error::{AcmeError, RegistrationError};

/// Default DNS port for recursive nameservers
const DNS_PORT: u16 = 53;

/// Options attached to a DNS-01 registration
///
/// The two options are independent; either, both or neither may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dns01Options {
    /// Recursive nameservers used for propagation checks, as `host:port`
    pub recursive_nameservers: Vec<String>,
    /// Skip the authoritative nameserver check
    pub disable_complete_propagation: bool,
}

impl Dns01Options {
    /// Use the given recursive nameservers for propagation checks
    ///
    /// Each entry is normalized to `host:port`, adding port 53 when absent.
    pub fn with_recursive_nameservers<I, S>(
        mut self,
        nameservers: I,
    ) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.recursive_nameservers = nameservers
            .into_iter()
            .map(|ns| normalize_nameserver(ns.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Consider a record propagated once the recursive nameservers see it
    pub fn with_complete_propagation_disabled(mut self) -> Self {
        self.disable_complete_propagation = true;
        self
    }
}

/// Normalize a nameserver address to `host:port`
pub fn normalize_nameserver(raw: &str) -> Result<String, RegistrationError> {
    let raw = raw.trim();
    let invalid = || RegistrationError::InvalidNameserver(raw.to_string());

    if raw.is_empty() {
        return Err(invalid());
    }
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr.to_string());
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT).to_string());
    }

    let (host, port) = match raw.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (raw, DNS_PORT),
    };

    let valid_host = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid_host {
        return Err(invalid());
    }

    Ok(format!("{}:{}", host, port))
}

/// Certificate request issued once challenges are registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainRequest {
    /// Names covered by the certificate, the first one being the primary
    pub domains: Vec<String>,
    /// Return the leaf together with its issuing chain
    pub bundle: bool,
}

/// An issued certificate
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Primary domain of the certificate
    pub domain: String,
    /// URL of the certificate resource on the ACME server
    pub certificate_url: String,
    /// Private key in PEM form
    pub private_key_pem: String,
    /// Leaf certificate, followed by the chain when bundled
    pub certificate_pem: String,
    /// Issuing chain, when the server returned one
    pub issuer_certificate_pem: Option<String>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("domain", &self.domain)
            .field("certificate_url", &self.certificate_url)
            .field("private_key_pem", &"<redacted>")
            .field("certificate_pem_len", &self.certificate_pem.len())
            .field("has_issuer", &self.issuer_certificate_pem.is_some())
            .finish()
    }
}

/// Per-acquisition ACME protocol client
///
/// Registration never touches the network; each `set_*` call replaces any
/// backend previously registered for that challenge type.
#[async_trait]
pub trait AcmeSession: Send {
    /// Register the DNS-01 backend
    fn set_dns01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
        options: Dns01Options,
    ) -> Result<(), RegistrationError>;

    /// Register the HTTP-01 backend
    fn set_http01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
    ) -> Result<(), RegistrationError>;

    /// Register the TLS-ALPN-01 backend
    fn set_tls_alpn01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
    ) -> Result<(), RegistrationError>;

    /// Run the ACME exchange and return the issued certificate
    ///
    /// Every wait inside the exchange observes `cancel`.
    async fn obtain(
        &mut self,
        request: ObtainRequest,
        cancel: CancellationToken,
    ) -> Result<CertificateBundle, AcmeError>;
}

/// Opens ACME sessions for an account
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// A fresh session with no registered backends
    async fn session(&self) -> Result<Box<dyn AcmeSession>, AcmeError>;
}

/// Timing of the ACME exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum time for authorizations to become valid
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,

    /// Maximum time for the certificate to be issued after finalization
    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,

    /// Interval between order status polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Propagation timeout for DNS providers that do not set their own
    #[serde(default = "default_propagation_timeout_secs")]
    pub propagation_timeout_secs: u64,

    /// Propagation polling interval for DNS providers that do not set their own
    #[serde(default = "default_propagation_interval_secs")]
    pub propagation_interval_secs: u64,
}

fn default_order_timeout_secs() -> u64 {
    300
}

fn default_finalize_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_propagation_timeout_secs() -> u64 {
    60
}

fn default_propagation_interval_secs() -> u64 {
    2
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            order_timeout_secs: default_order_timeout_secs(),
            finalize_timeout_secs: default_finalize_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            propagation_timeout_secs: default_propagation_timeout_secs(),
            propagation_interval_secs: default_propagation_interval_secs(),
        }
    }
}

impl SessionSettings {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_secs(self.finalize_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Default (timeout, polling interval) for DNS propagation
    pub fn propagation(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.propagation_timeout_secs),
            Duration::from_secs(self.propagation_interval_secs),
        )
    }
}
