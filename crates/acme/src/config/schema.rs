//! Provider configuration schemas and resolved settings
//!
//! A [`ProviderSchema`] describes every logical setting a DNS provider
//! accepts: its type, static default, the environment variables it is read
//! from, and the override keys (aliases) that may replace it. Alias order is
//! the precedence rank, so precedence lives in data rather than in code.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Type of a logical setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Duration,
    Integer,
}

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(Cow<'static, str>),
    Duration(Duration),
    Integer(i64),
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Default,
    Environment,
    Override,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingSource::Default => write!(f, "default"),
            SettingSource::Environment => write!(f, "environment"),
            SettingSource::Override => write!(f, "override"),
        }
    }
}

/// One logical setting of a provider
#[derive(Debug)]
pub struct SettingSpec {
    /// Logical field name
    pub name: &'static str,
    /// Value type
    pub kind: SettingKind,
    /// Documented default
    pub default: Option<SettingValue>,
    /// Environment variables, first present one wins
    pub env: &'static [&'static str],
    /// Override keys in ascending precedence, last present one wins
    pub aliases: &'static [&'static str],
    /// Resolution fails when no source supplies a value
    pub required: bool,
}

impl SettingSpec {
    /// The key named in errors about this setting
    pub fn primary_key(&self) -> &'static str {
        self.env
            .first()
            .or_else(|| self.aliases.first())
            .copied()
            .unwrap_or(self.name)
    }
}

/// The full configuration schema of one provider
#[derive(Debug)]
pub struct ProviderSchema {
    /// Provider identifier
    pub provider: &'static str,
    /// Every setting the provider accepts
    pub settings: &'static [SettingSpec],
}

impl ProviderSchema {
    /// Look up a setting by logical name
    pub fn setting(&self, name: &str) -> Option<&SettingSpec> {
        self.settings.iter().find(|s| s.name == name)
    }
}

/// Fully resolved provider settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    values: BTreeMap<&'static str, SettingValue>,
    sources: BTreeMap<&'static str, SettingSource>,
}

impl ResolvedSettings {
    pub(crate) fn insert(
        &mut self,
        name: &'static str,
        value: SettingValue,
        source: SettingSource,
    ) {
        self.values.insert(name, value);
        self.sources.insert(name, source);
    }

    /// Raw value of a setting
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Whether the setting received a value
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Source of a setting's value
    pub fn source(&self, name: &str) -> Option<SettingSource> {
        self.sources.get(name).copied()
    }

    /// Text value of a setting; empty strings count as unset
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(SettingValue::Text(s)) if !s.is_empty() => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Duration value of a setting
    pub fn duration(&self, name: &str) -> Option<Duration> {
        match self.values.get(name) {
            Some(SettingValue::Duration(d)) => Some(*d),
            _ => None,
        }
    }

    /// Integer value of a setting
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(SettingValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Number of settings that received a value
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no setting received a value
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Setting names paired with their value sources
    pub fn sources(&self) -> impl Iterator<Item = (&'static str, SettingSource)> + '_ {
        self.sources.iter().map(|(k, v)| (*k, *v))
    }
}
