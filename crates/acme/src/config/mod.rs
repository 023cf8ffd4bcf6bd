//! Layered provider configuration
//!
//! Provider settings are resolved from three layers, later layers winning
//! field by field:
//!
//! 1. the provider's documented defaults
//! 2. the process environment ([`Environment`])
//! 3. the account's request-scoped override mapping
//!
//! Within the override layer a setting may be reachable through several
//! alias keys; every non-empty alias is parsed and the one declared last
//! wins. Empty override values are treated as unset.

mod duration;
mod env;
mod schema;

pub use duration::{parse_duration, parse_env_duration, parse_integer};
pub use env::{Environment, ProcessEnvironment, StaticEnvironment};
pub use schema::{
    ProviderSchema, ResolvedSettings, SettingKind, SettingSource, SettingSpec, SettingValue,
};

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::trace;

use crate::error::{ConfigError, ParseError};

/// Resolve a provider's settings against the environment and overrides
///
/// Resolution is fail-fast: the first malformed or missing value aborts it
/// and no partially resolved settings are returned.
pub fn resolve(
    schema: &ProviderSchema,
    env: &dyn Environment,
    overrides: &HashMap<String, String>,
) -> Result<ResolvedSettings, ConfigError> {
    let mut settings = ResolvedSettings::default();

    for spec in schema.settings {
        if let Some(ref default) = spec.default {
            settings.insert(spec.name, default.clone(), SettingSource::Default);
        }

        let from_env = spec
            .env
            .iter()
            .find_map(|name| env.lookup(name).filter(|v| !v.is_empty()).map(|v| (*name, v)));
        if let Some((name, raw)) = from_env {
            let value = parse_value(spec.kind, &raw, parse_env_duration).map_err(|source| {
                ConfigError::Invalid {
                    key: name.to_string(),
                    source,
                }
            })?;
            trace!(
                provider = schema.provider,
                setting = spec.name,
                key = name,
                "Applied environment value"
            );
            settings.insert(spec.name, value, SettingSource::Environment);
        }

        for alias in spec.aliases {
            let Some(raw) = overrides.get(*alias).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = parse_value(spec.kind, raw, parse_duration).map_err(|source| {
                ConfigError::Invalid {
                    key: alias.to_string(),
                    source,
                }
            })?;
            trace!(
                provider = schema.provider,
                setting = spec.name,
                key = alias,
                "Applied override value"
            );
            settings.insert(spec.name, value, SettingSource::Override);
        }

        if spec.required && !settings.contains(spec.name) {
            return Err(ConfigError::Missing {
                key: spec.primary_key().to_string(),
            });
        }
    }

    Ok(settings)
}

fn parse_value(
    kind: SettingKind,
    raw: &str,
    duration: fn(&str) -> Result<std::time::Duration, ParseError>,
) -> Result<SettingValue, ParseError> {
    match kind {
        SettingKind::Text => Ok(SettingValue::Text(Cow::Owned(raw.to_string()))),
        SettingKind::Duration => duration(raw).map(SettingValue::Duration),
        SettingKind::Integer => parse_integer(raw).map(SettingValue::Integer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    static TEST_SETTINGS: [SettingSpec; 4] = [
        SettingSpec {
            name: "token",
            kind: SettingKind::Text,
            default: None,
            env: &["TEST_TOKEN", "TEST_ALT_TOKEN"],
            aliases: &["TEST_TOKEN", "TEST_ALT_TOKEN", "TEST_LEGACY_TOKEN"],
            required: false,
        },
        SettingSpec {
            name: "path",
            kind: SettingKind::Text,
            default: None,
            env: &["TEST_PATH"],
            aliases: &["TEST_PATH"],
            required: true,
        },
        SettingSpec {
            name: "timeout",
            kind: SettingKind::Duration,
            default: Some(SettingValue::Duration(Duration::from_secs(60))),
            env: &["TEST_TIMEOUT"],
            aliases: &["TEST_TIMEOUT"],
            required: false,
        },
        SettingSpec {
            name: "ttl",
            kind: SettingKind::Integer,
            default: Some(SettingValue::Integer(120)),
            env: &["TEST_TTL"],
            aliases: &["TEST_TTL"],
            required: false,
        },
    ];

    static TEST_SCHEMA: ProviderSchema = ProviderSchema {
        provider: "test",
        settings: &TEST_SETTINGS,
    };

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_env() -> StaticEnvironment {
        StaticEnvironment::new().with("TEST_PATH", "/bin/hook")
    }

    #[test]
    fn test_defaults_applied() {
        let settings = resolve(&TEST_SCHEMA, &base_env(), &HashMap::new()).unwrap();

        assert_eq!(settings.duration("timeout"), Some(Duration::from_secs(60)));
        assert_eq!(settings.integer("ttl"), Some(120));
        assert_eq!(settings.source("ttl"), Some(SettingSource::Default));
        assert_eq!(settings.text("token"), None);
    }

    #[test]
    fn test_environment_overrides_default() {
        let env = base_env().with("TEST_TIMEOUT", "30").with("TEST_TTL", "300");
        let settings = resolve(&TEST_SCHEMA, &env, &HashMap::new()).unwrap();

        // Bare integers from the environment are seconds
        assert_eq!(settings.duration("timeout"), Some(Duration::from_secs(30)));
        assert_eq!(settings.integer("ttl"), Some(300));
        assert_eq!(settings.source("ttl"), Some(SettingSource::Environment));
    }

    #[test]
    fn test_environment_first_name_wins() {
        let env = base_env()
            .with("TEST_TOKEN", "primary")
            .with("TEST_ALT_TOKEN", "fallback");
        let settings = resolve(&TEST_SCHEMA, &env, &HashMap::new()).unwrap();
        assert_eq!(settings.text("token"), Some("primary"));

        let env = base_env().with("TEST_ALT_TOKEN", "fallback");
        let settings = resolve(&TEST_SCHEMA, &env, &HashMap::new()).unwrap();
        assert_eq!(settings.text("token"), Some("fallback"));
    }

    #[test]
    fn test_override_beats_environment() {
        let env = base_env().with("TEST_TIMEOUT", "30s");
        let settings = resolve(
            &TEST_SCHEMA,
            &env,
            &overrides(&[("TEST_TIMEOUT", "2m"), ("TEST_PATH", "/opt/hook")]),
        )
        .unwrap();

        assert_eq!(settings.duration("timeout"), Some(Duration::from_secs(120)));
        assert_eq!(settings.text("path"), Some("/opt/hook"));
        assert_eq!(settings.source("path"), Some(SettingSource::Override));
    }

    #[test]
    fn test_empty_override_is_unset() {
        let env = base_env().with("TEST_TOKEN", "from-env");
        let with_empty = resolve(
            &TEST_SCHEMA,
            &env,
            &overrides(&[("TEST_TOKEN", ""), ("TEST_TTL", ""), ("TEST_PATH", "")]),
        )
        .unwrap();
        let without = resolve(&TEST_SCHEMA, &env, &HashMap::new()).unwrap();

        assert_eq!(with_empty, without);
        assert_eq!(with_empty.text("token"), Some("from-env"));
    }

    #[test]
    fn test_later_alias_wins() {
        let settings = resolve(
            &TEST_SCHEMA,
            &base_env(),
            &overrides(&[("TEST_LEGACY_TOKEN", "legacy"), ("TEST_TOKEN", "first")]),
        )
        .unwrap();
        assert_eq!(settings.text("token"), Some("legacy"));
    }

    #[test]
    fn test_required_missing_names_key() {
        let err = resolve(&TEST_SCHEMA, &StaticEnvironment::new(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == "TEST_PATH"));
    }

    #[test]
    fn test_required_satisfied_by_override() {
        let settings = resolve(
            &TEST_SCHEMA,
            &StaticEnvironment::new(),
            &overrides(&[("TEST_PATH", "/bin/hook")]),
        )
        .unwrap();
        assert_eq!(settings.text("path"), Some("/bin/hook"));
    }

    #[test]
    fn test_malformed_values_name_key() {
        let err = resolve(&TEST_SCHEMA, &base_env(), &overrides(&[("TEST_TTL", "abc")]))
            .unwrap_err();
        assert_eq!(err.key(), "TEST_TTL");
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = resolve(&TEST_SCHEMA, &base_env(), &overrides(&[("TEST_TIMEOUT", "5x")]))
            .unwrap_err();
        assert_eq!(err.key(), "TEST_TIMEOUT");

        let env = base_env().with("TEST_TIMEOUT", "later");
        let err = resolve(&TEST_SCHEMA, &env, &HashMap::new()).unwrap_err();
        assert_eq!(err.key(), "TEST_TIMEOUT");
    }

    #[test]
    fn test_malformed_earlier_alias_fails() {
        static DURATION_ALIASES: [SettingSpec; 1] = [SettingSpec {
            name: "interval",
            kind: SettingKind::Duration,
            default: None,
            env: &[],
            aliases: &["OLD_INTERVAL", "NEW_INTERVAL"],
            required: false,
        }];
        static SCHEMA: ProviderSchema = ProviderSchema {
            provider: "aliases",
            settings: &DURATION_ALIASES,
        };

        let err = resolve(
            &SCHEMA,
            &StaticEnvironment::new(),
            &overrides(&[("OLD_INTERVAL", "soon"), ("NEW_INTERVAL", "5s")]),
        )
        .unwrap_err();
        assert_eq!(err.key(), "OLD_INTERVAL");
    }

    proptest! {
        #[test]
        fn prop_alias_precedence_ignores_insertion_order(
            values in proptest::collection::vec("[a-z]{1,8}", 3),
            order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        ) {
            let aliases = ["TEST_TOKEN", "TEST_ALT_TOKEN", "TEST_LEGACY_TOKEN"];
            let mut map = HashMap::new();
            map.insert("TEST_PATH".to_string(), "/bin/hook".to_string());
            for i in order {
                map.insert(aliases[i].to_string(), values[i].clone());
            }

            let settings = resolve(&TEST_SCHEMA, &StaticEnvironment::new(), &map).unwrap();
            prop_assert_eq!(settings.text("token"), Some(values[2].as_str()));
        }
    }
}
