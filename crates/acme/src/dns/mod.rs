//! DNS-01 challenge support
//!
//! # Architecture
//!
//! - [`ProviderRegistry`] - Maps provider identifiers to configuration
//!   schemas and constructors
//! - [`build_provider`] - Resolves configuration and constructs a provider
//! - [`PropagationChecker`] - Verifies TXT record visibility before validation
//!
//! # Providers
//!
//! - [`CloudflareProvider`] - Cloudflare API v4
//! - [`ExecProvider`] - External program hook
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use certward_acme::dns::build_provider;
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("CF_DNS_API_TOKEN".to_string(), "tok123".to_string());
//! let provider = build_provider("cloudflare", &overrides)?;
//! ```

mod propagation;
pub mod providers;
mod registry;

pub use propagation::{PropagationChecker, PropagationConfig};
pub use providers::{CloudflareConfig, CloudflareProvider, ExecConfig, ExecMode, ExecProvider};
pub use registry::{build_provider, ProviderConstructor, ProviderEntry, ProviderRegistry};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Default propagation timeout for DNS providers
pub const DEFAULT_PROPAGATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Default polling interval for DNS providers
pub const DEFAULT_POLLING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Default TTL for challenge records
pub const DEFAULT_TTL: i64 = 120;

/// The TXT record that answers a DNS-01 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Fully qualified record name without the trailing dot
    pub fqdn: String,
    /// Record value
    pub value: String,
}

/// Strip the wildcard label from a domain
///
/// For wildcard domains (*.example.com), returns the base domain.
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Compute the TXT record for a DNS-01 challenge
///
/// The record lives at `_acme-challenge.<domain>` and holds the
/// base64url-encoded SHA-256 digest of the key authorization.
pub fn challenge_record(domain: &str, key_authorization: &str) -> ChallengeRecord {
    let digest = Sha256::digest(key_authorization.as_bytes());
    ChallengeRecord {
        fqdn: format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain)),
        value: URL_SAFE_NO_PAD.encode(digest),
    }
}
