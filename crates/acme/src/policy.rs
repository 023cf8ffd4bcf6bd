//! Account-level challenge policy

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which challenge types an account uses, and how DNS-01 is configured
///
/// Every field is optional when deserialized; the default policy enables no
/// challenge type at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPolicy {
    /// DNS-01 provider identifier; empty disables DNS-01
    pub provider: String,

    /// Provider configuration overrides, keyed by configuration key
    pub provider_configuration: HashMap<String, String>,

    /// Recursive resolvers for propagation checks; empty uses the system resolver
    pub dns_resolvers: Vec<String>,

    /// Skip the authoritative nameserver propagation check
    pub ignore_dns_propagation: bool,

    #[serde(rename = "enable_http_01")]
    pub enable_http01: bool,

    #[serde(rename = "enable_tls_alpn_01")]
    pub enable_tls_alpn01: bool,
}

impl AccountPolicy {
    /// Policy with every challenge type disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable DNS-01 through the given provider
    pub fn with_dns_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Add one provider configuration override
    pub fn with_provider_setting(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.provider_configuration.insert(key.into(), value.into());
        self
    }

    /// Use the given recursive resolvers for propagation checks
    pub fn with_dns_resolvers<I, S>(mut self, resolvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_resolvers = resolvers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ignore_dns_propagation(mut self, ignore: bool) -> Self {
        self.ignore_dns_propagation = ignore;
        self
    }

    pub fn with_http01(mut self, enabled: bool) -> Self {
        self.enable_http01 = enabled;
        self
    }

    pub fn with_tls_alpn01(mut self, enabled: bool) -> Self {
        self.enable_tls_alpn01 = enabled;
        self
    }

    /// Whether DNS-01 is enabled
    pub fn dns01_enabled(&self) -> bool {
        !self.provider.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_everything() {
        let policy = AccountPolicy::default();
        assert!(!policy.dns01_enabled());
        assert!(!policy.enable_http01);
        assert!(!policy.enable_tls_alpn01);
        assert!(!policy.ignore_dns_propagation);
    }

    #[test]
    fn test_deserialize_partial() {
        let policy: AccountPolicy = serde_json::from_str(
            r#"{
                "provider": "cloudflare",
                "provider_configuration": {"CF_DNS_API_TOKEN": "tok123"},
                "enable_http_01": true
            }"#,
        )
        .unwrap();

        assert!(policy.dns01_enabled());
        assert_eq!(
            policy.provider_configuration.get("CF_DNS_API_TOKEN").map(String::as_str),
            Some("tok123")
        );
        assert!(policy.enable_http01);
        assert!(!policy.enable_tls_alpn01);
        assert!(policy.dns_resolvers.is_empty());
    }

    #[test]
    fn test_builder() {
        let policy = AccountPolicy::new()
            .with_dns_provider("exec")
            .with_provider_setting("EXEC_PATH", "/bin/hook")
            .with_dns_resolvers(["8.8.8.8"])
            .with_ignore_dns_propagation(true)
            .with_tls_alpn01(true);

        assert_eq!(policy.provider, "exec");
        assert_eq!(policy.dns_resolvers, vec!["8.8.8.8"]);
        assert!(policy.ignore_dns_propagation);
        assert!(policy.enable_tls_alpn01);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["enable_tls_alpn_01"], true);
        assert_eq!(json["enable_http_01"], false);
    }
}
