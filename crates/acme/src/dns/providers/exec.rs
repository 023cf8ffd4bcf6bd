//! External program DNS provider
//!
//! Delegates record management to an executable. By default the program is
//! called as `<program> present|cleanup <fqdn> <value>`; in `RAW` mode it
//! receives the unprocessed challenge as
//! `<program> present|cleanup -- <domain> <token> <key-authorization>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::challenge::{ChallengeProvider, ProviderResult};
use crate::config::{ProviderSchema, ResolvedSettings, SettingKind, SettingSpec, SettingValue};
use crate::dns::{challenge_record, DEFAULT_POLLING_INTERVAL, DEFAULT_PROPAGATION_TIMEOUT};
use crate::error::{ConfigError, ProviderError};

pub const EXEC_PATH: &str = "EXEC_PATH";
pub const EXEC_MODE: &str = "EXEC_MODE";
pub const EXEC_PROPAGATION_TIMEOUT: &str = "EXEC_PROPAGATION_TIMEOUT";
pub const EXEC_POLLING_INTERVAL: &str = "EXEC_POLLING_INTERVAL";
pub const EXEC_SEQUENCE_INTERVAL: &str = "EXEC_SEQUENCE_INTERVAL";

static EXEC_SETTINGS: [SettingSpec; 5] = [
    SettingSpec {
        name: "program",
        kind: SettingKind::Text,
        default: None,
        env: &[EXEC_PATH],
        aliases: &[EXEC_PATH],
        required: true,
    },
    SettingSpec {
        name: "mode",
        kind: SettingKind::Text,
        default: None,
        env: &[EXEC_MODE],
        aliases: &[EXEC_MODE],
        required: false,
    },
    SettingSpec {
        name: "propagation_timeout",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_PROPAGATION_TIMEOUT)),
        env: &[EXEC_PROPAGATION_TIMEOUT],
        aliases: &[EXEC_PROPAGATION_TIMEOUT],
        required: false,
    },
    SettingSpec {
        name: "polling_interval",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_POLLING_INTERVAL)),
        env: &[EXEC_POLLING_INTERVAL],
        aliases: &[EXEC_POLLING_INTERVAL],
        required: false,
    },
    SettingSpec {
        name: "sequence_interval",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_PROPAGATION_TIMEOUT)),
        env: &[EXEC_SEQUENCE_INTERVAL],
        aliases: &[EXEC_SEQUENCE_INTERVAL],
        required: false,
    },
];

/// Configuration schema of the `exec` provider
pub static EXEC_SCHEMA: ProviderSchema = ProviderSchema {
    provider: "exec",
    settings: &EXEC_SETTINGS,
};

/// How challenge data is passed to the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// FQDN and record value
    #[default]
    Default,
    /// Domain, token and key authorization
    Raw,
}

/// Resolved `exec` provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub program: String,
    pub mode: ExecMode,
    pub propagation_timeout: Duration,
    pub polling_interval: Duration,
    pub sequence_interval: Duration,
}

impl ExecConfig {
    /// Configuration with defaults for everything but the program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            mode: ExecMode::Default,
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            sequence_interval: DEFAULT_PROPAGATION_TIMEOUT,
        }
    }

    /// Build the configuration from resolved settings
    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self, ConfigError> {
        let program = settings.text("program").ok_or_else(|| ConfigError::Missing {
            key: EXEC_PATH.to_string(),
        })?;

        let mode = match settings.text("mode") {
            Some("RAW") => ExecMode::Raw,
            _ => ExecMode::Default,
        };

        Ok(Self {
            program: program.to_string(),
            mode,
            propagation_timeout: settings
                .duration("propagation_timeout")
                .unwrap_or(DEFAULT_PROPAGATION_TIMEOUT),
            polling_interval: settings
                .duration("polling_interval")
                .unwrap_or(DEFAULT_POLLING_INTERVAL),
            sequence_interval: settings
                .duration("sequence_interval")
                .unwrap_or(DEFAULT_PROPAGATION_TIMEOUT),
        })
    }
}

/// DNS provider that shells out to an external program
#[derive(Debug)]
pub struct ExecProvider {
    config: ExecConfig,
}

impl ExecProvider {
    /// Create a provider from its configuration
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    /// The provider configuration
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    fn arguments(
        &self,
        action: &str,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Vec<String> {
        match self.config.mode {
            ExecMode::Raw => vec![
                action.to_string(),
                "--".to_string(),
                domain.to_string(),
                token.to_string(),
                key_authorization.to_string(),
            ],
            ExecMode::Default => {
                let record = challenge_record(domain, key_authorization);
                vec![action.to_string(), format!("{}.", record.fqdn), record.value]
            }
        }
    }

    async fn run(&self, args: Vec<String>) -> ProviderResult<()> {
        debug!(program = %self.config.program, action = %args[0], "Running DNS hook program");

        let output = Command::new(&self.config.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Command {
                program: self.config.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(program = %self.config.program, "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %self.config.program,
                status = %output.status,
                "DNS hook program failed"
            );
            return Err(ProviderError::Command {
                program: self.config.program.clone(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ChallengeProvider for ExecProvider {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        self.run(self.arguments("present", domain, token, key_authorization))
            .await
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        self.run(self.arguments("cleanup", domain, token, key_authorization))
            .await
    }

    fn timeout(&self) -> Option<(Duration, Duration)> {
        Some((self.config.propagation_timeout, self.config.polling_interval))
    }

    fn sequence_interval(&self) -> Option<Duration> {
        Some(self.config.sequence_interval)
    }
}

pub(crate) fn build(
    settings: &ResolvedSettings,
) -> Result<Arc<dyn ChallengeProvider>, ConfigError> {
    Ok(Arc::new(ExecProvider::new(ExecConfig::from_settings(settings)?)))
}
