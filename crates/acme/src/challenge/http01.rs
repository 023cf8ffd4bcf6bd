//! HTTP-01 challenge store
//!
//! Holds pending HTTP-01 answers for serving via
//! `/.well-known/acme-challenge/<token>`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::{ChallengeProvider, ProviderResult};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Pending HTTP-01 challenges
///
/// The ACME server validates domain ownership by requesting a well-known
/// path. This store keeps the token -> key authorization mapping so the
/// host's request filter can serve the right response.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct Http01ChallengeStore {
    /// Map of challenge token -> key authorization response
    challenges: Arc<DashMap<String, String>>,
}

impl Http01ChallengeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Key authorization for a challenge token, if one is pending
    pub fn get_response(&self, token: &str) -> Option<String> {
        let result = self.challenges.get(token).map(|v| v.clone());
        if result.is_some() {
            trace!(token = %token, "HTTP-01 challenge token found");
        } else {
            trace!(token = %token, "HTTP-01 challenge token not found");
        }
        result
    }

    /// Token from a request path, if the path is a challenge path
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
    }

    /// Number of pending challenges
    pub fn pending_count(&self) -> usize {
        self.challenges.len()
    }
}

#[async_trait]
impl ChallengeProvider for Http01ChallengeStore {
    fn name(&self) -> &'static str {
        "http-01"
    }

    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        debug!(domain = %domain, token = %token, "Registering HTTP-01 challenge");
        self.challenges
            .insert(token.to_string(), key_authorization.to_string());
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        _key_authorization: &str,
    ) -> ProviderResult<()> {
        if self.challenges.remove(token).is_some() {
            debug!(domain = %domain, token = %token, "Removed HTTP-01 challenge");
        }
        Ok(())
    }
}
