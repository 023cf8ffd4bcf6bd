//! DNS provider registry
//!
//! Maps provider identifiers to their configuration schema and constructor.
//! Adding a provider means registering one more [`ProviderEntry`]; nothing
//! else in the crate changes.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use super::providers::{build_cloudflare, build_exec, CLOUDFLARE_SCHEMA, EXEC_SCHEMA};
use crate::challenge::ChallengeProvider;
use crate::config::{resolve, Environment, ProcessEnvironment, ProviderSchema, ResolvedSettings};
use crate::error::{AcmeError, ConfigError};

/// Constructor turning resolved settings into a provider
pub type ProviderConstructor =
    fn(&ResolvedSettings) -> Result<Arc<dyn ChallengeProvider>, ConfigError>;

/// A registered DNS provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderEntry {
    /// Settings the provider accepts
    pub schema: &'static ProviderSchema,
    /// Builds the provider from its resolved settings
    pub build: ProviderConstructor,
}

static BUILTIN: Lazy<ProviderRegistry> = Lazy::new(|| {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderEntry {
        schema: &CLOUDFLARE_SCHEMA,
        build: build_cloudflare,
    });
    registry.register(ProviderEntry {
        schema: &EXEC_SCHEMA,
        build: build_exec,
    });
    registry
});

/// Identifier -> provider entry
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: HashMap<&'static str, ProviderEntry>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry holding the built-in providers
    pub fn builtin() -> &'static ProviderRegistry {
        &BUILTIN
    }

    /// Register a provider under its schema's identifier
    ///
    /// Returns the entry previously registered under that identifier.
    pub fn register(&mut self, entry: ProviderEntry) -> Option<ProviderEntry> {
        self.entries.insert(entry.schema.provider, entry)
    }

    /// Whether a provider identifier is registered
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Entry registered under an identifier
    pub fn get(&self, identifier: &str) -> Option<&ProviderEntry> {
        self.entries.get(identifier)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve a provider's configuration and construct it
    ///
    /// Fails with [`AcmeError::UnsupportedProvider`] for unknown identifiers
    /// and with [`AcmeError::Configuration`] naming the offending key when
    /// resolution or construction fails. No provider is constructed after a
    /// configuration error.
    pub fn build(
        &self,
        identifier: &str,
        env: &dyn Environment,
        overrides: &HashMap<String, String>,
    ) -> Result<Arc<dyn ChallengeProvider>, AcmeError> {
        let entry = self
            .entries
            .get(identifier)
            .ok_or_else(|| AcmeError::UnsupportedProvider(identifier.to_string()))?;

        let configuration_error = |source: ConfigError| {
            warn!(
                provider = %identifier,
                key = %source.key(),
                "Invalid DNS provider configuration"
            );
            AcmeError::Configuration {
                provider: identifier.to_string(),
                source,
            }
        };

        let settings = resolve(entry.schema, env, overrides).map_err(configuration_error)?;

        let sources: Vec<String> = settings
            .sources()
            .map(|(name, source)| format!("{}={}", name, source))
            .collect();
        debug!(
            provider = %identifier,
            sources = %sources.join(","),
            "Resolved DNS provider configuration"
        );

        (entry.build)(&settings).map_err(configuration_error)
    }
}

/// Build a DNS provider from the built-in registry
///
/// Configuration is resolved against the process environment and the given
/// overrides.
pub fn build_provider(
    identifier: &str,
    overrides: &HashMap<String, String>,
) -> Result<Arc<dyn ChallengeProvider>, AcmeError> {
    ProviderRegistry::builtin().build(identifier, &ProcessEnvironment, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticEnvironment;
    use crate::dns::providers::keys::*;
    use std::time::Duration;

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// A complete, valid override mapping for each built-in provider
    fn complete(identifier: &str) -> HashMap<String, String> {
        match identifier {
            "cloudflare" => overrides(&[
                (CF_DNS_API_TOKEN, "tok123"),
                (CLOUDFLARE_TTL, "300"),
                (CLOUDFLARE_PROPAGATION_TIMEOUT, "3m"),
                (CLOUDFLARE_POLLING_INTERVAL, "5s"),
                (CLOUDFLARE_HTTP_TIMEOUT, "10s"),
            ]),
            "exec" => overrides(&[
                (EXEC_PATH, "/usr/local/bin/dns-hook"),
                (EXEC_MODE, "RAW"),
                (EXEC_PROPAGATION_TIMEOUT, "90s"),
                (EXEC_POLLING_INTERVAL, "3s"),
                (EXEC_SEQUENCE_INTERVAL, "1m"),
            ]),
            other => panic!("no fixture for provider {}", other),
        }
    }

    #[test]
    fn test_builtin_identifiers() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.identifiers(), vec!["cloudflare", "exec"]);
        assert!(registry.contains("cloudflare"));
        assert!(!registry.contains("route53"));
    }

    #[test]
    fn test_unknown_provider() {
        let err = ProviderRegistry::builtin()
            .build("unknown-id", &StaticEnvironment::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, AcmeError::UnsupportedProvider(ref id) if id == "unknown-id"));

        let err = build_provider("unknown-id", &HashMap::new()).unwrap_err();
        assert!(matches!(err, AcmeError::UnsupportedProvider(_)));
    }

    #[test]
    fn test_complete_mapping_builds_every_provider() {
        let registry = ProviderRegistry::builtin();
        for id in registry.identifiers() {
            let provider = registry
                .build(id, &StaticEnvironment::new(), &complete(id))
                .unwrap_or_else(|e| panic!("{} failed to build: {}", id, e));
            assert_eq!(provider.name(), id);
        }
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let registry = ProviderRegistry::builtin();
        for id in registry.identifiers() {
            let entry = registry.get(id).unwrap();
            for spec in entry.schema.settings.iter().filter(|s| s.required) {
                let mut mapping = complete(id);
                for alias in spec.aliases {
                    mapping.remove(*alias);
                }

                let err = registry
                    .build(id, &StaticEnvironment::new(), &mapping)
                    .unwrap_err();
                assert_eq!(err.config_key(), Some(spec.primary_key()));
            }
        }
    }

    #[test]
    fn test_cloudflare_missing_token_is_named() {
        let err = ProviderRegistry::builtin()
            .build("cloudflare", &StaticEnvironment::new(), &HashMap::new())
            .unwrap_err();
        assert_eq!(err.config_key(), Some(CLOUDFLARE_DNS_API_TOKEN));
    }

    #[test]
    fn test_cloudflare_ttl_errors() {
        let registry = ProviderRegistry::builtin();

        let provider = registry
            .build(
                "cloudflare",
                &StaticEnvironment::new(),
                &overrides(&[(CF_DNS_API_TOKEN, "tok123"), (CLOUDFLARE_TTL, "120")]),
            )
            .unwrap();
        assert_eq!(provider.name(), "cloudflare");

        let err = registry
            .build(
                "cloudflare",
                &StaticEnvironment::new(),
                &overrides(&[(CF_DNS_API_TOKEN, "tok123"), (CLOUDFLARE_TTL, "abc")]),
            )
            .unwrap_err();
        assert_eq!(err.config_key(), Some(CLOUDFLARE_TTL));
        assert!(err.to_string().contains("CLOUDFLARE_TTL"));
    }

    #[test]
    fn test_malformed_duration_fails_before_construction() {
        let registry = ProviderRegistry::builtin();
        for (id, key) in [
            ("exec", EXEC_POLLING_INTERVAL),
            ("exec", EXEC_PROPAGATION_TIMEOUT),
            ("cloudflare", CLOUDFLARE_HTTP_TIMEOUT),
            ("cloudflare", CLOUDFLARE_PROPAGATION_TIMEOUT),
        ] {
            let mut mapping = complete(id);
            mapping.insert(key.to_string(), "5x".to_string());

            let err = registry
                .build(id, &StaticEnvironment::new(), &mapping)
                .unwrap_err();
            assert_eq!(err.config_key(), Some(key));
        }
    }

    #[test]
    fn test_empty_override_equals_absent() {
        let registry = ProviderRegistry::builtin();
        let env = StaticEnvironment::new().with(EXEC_PATH, "/bin/hook");

        let mut mapping = complete("exec");
        mapping.insert(EXEC_PATH.to_string(), String::new());
        mapping.insert(EXEC_POLLING_INTERVAL.to_string(), String::new());

        let provider = registry.build("exec", &env, &mapping).unwrap();
        assert_eq!(
            provider.timeout(),
            Some((Duration::from_secs(90), Duration::from_secs(2)))
        );
    }

    #[test]
    fn test_environment_supplies_settings() {
        let env = StaticEnvironment::new()
            .with(CLOUDFLARE_DNS_API_TOKEN, "from-env")
            .with(CLOUDFLARE_POLLING_INTERVAL, "7");

        let provider = ProviderRegistry::builtin()
            .build("cloudflare", &env, &HashMap::new())
            .unwrap();
        assert_eq!(
            provider.timeout(),
            Some((Duration::from_secs(120), Duration::from_secs(7)))
        );
    }

    #[test]
    fn test_custom_registration_replaces_entry() {
        let mut registry = ProviderRegistry::new();
        assert!(registry
            .register(ProviderEntry {
                schema: &EXEC_SCHEMA,
                build: build_exec,
            })
            .is_none());
        assert!(registry
            .register(ProviderEntry {
                schema: &EXEC_SCHEMA,
                build: build_exec,
            })
            .is_some());
        assert_eq!(registry.identifiers(), vec!["exec"]);
    }
}
