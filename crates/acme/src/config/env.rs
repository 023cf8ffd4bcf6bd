//! Read-only access to environment variables
//!
//! Provider configuration reads the process environment through the
//! [`Environment`] trait so tests can supply fixed values without touching
//! real process state.

use std::collections::HashMap;
use std::fmt::Debug;

/// Lookup of environment variables by exact name
pub trait Environment: Send + Sync + Debug {
    /// Returns the value of `name`, or `None` when it is not set
    fn lookup(&self, name: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed set of variables
#[derive(Debug, Default, Clone)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
}

impl StaticEnvironment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for StaticEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_environment_lookup() {
        let env = StaticEnvironment::new().with("EXEC_PATH", "/usr/local/bin/dns-hook");

        assert_eq!(
            env.lookup("EXEC_PATH"),
            Some("/usr/local/bin/dns-hook".to_string())
        );
        assert_eq!(env.lookup("exec_path"), None);
        assert_eq!(env.lookup("EXEC_MODE"), None);
    }

    #[test]
    fn test_static_environment_from_iter() {
        let env: StaticEnvironment = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.lookup("A"), Some("1".to_string()));
        assert_eq!(env.lookup("B"), Some("2".to_string()));
    }

    #[test]
    fn test_process_environment_missing_variable() {
        assert_eq!(
            ProcessEnvironment.lookup("CERTWARD_TEST_UNSET_VARIABLE_31337"),
            None
        );
    }
}
