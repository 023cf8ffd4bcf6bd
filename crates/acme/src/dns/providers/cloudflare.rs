//! Cloudflare DNS provider implementation
//!
//! Uses the Cloudflare API v4 to manage TXT records for DNS-01 challenges.
//! API documentation: <https://developers.cloudflare.com/api/>

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::challenge::{ChallengeProvider, ProviderResult};
use crate::config::{ProviderSchema, ResolvedSettings, SettingKind, SettingSpec, SettingValue};
use crate::dns::{challenge_record, normalize_domain, DEFAULT_POLLING_INTERVAL, DEFAULT_TTL};
use crate::error::{ConfigError, ProviderError};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Smallest TTL Cloudflare accepts for non-automatic records
const MIN_TTL: i64 = 120;

const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const CLOUDFLARE_EMAIL: &str = "CLOUDFLARE_EMAIL";
pub const CF_API_EMAIL: &str = "CF_API_EMAIL";
pub const CLOUDFLARE_API_KEY: &str = "CLOUDFLARE_API_KEY";
pub const CF_API_KEY: &str = "CF_API_KEY";
pub const CLOUDFLARE_DNS_API_TOKEN: &str = "CLOUDFLARE_DNS_API_TOKEN";
pub const CF_DNS_API_TOKEN: &str = "CF_DNS_API_TOKEN";
pub const CLOUDFLARE_ZONE_API_TOKEN: &str = "CLOUDFLARE_ZONE_API_TOKEN";
pub const CF_ZONE_API_TOKEN: &str = "CF_ZONE_API_TOKEN";
pub const CLOUDFLARE_TTL: &str = "CLOUDFLARE_TTL";
pub const CLOUDFLARE_PROPAGATION_TIMEOUT: &str = "CLOUDFLARE_PROPAGATION_TIMEOUT";
pub const CLOUDFLARE_POLLING_INTERVAL: &str = "CLOUDFLARE_POLLING_INTERVAL";
pub const CLOUDFLARE_HTTP_TIMEOUT: &str = "CLOUDFLARE_HTTP_TIMEOUT";

static CLOUDFLARE_SETTINGS: [SettingSpec; 8] = [
    SettingSpec {
        name: "auth_email",
        kind: SettingKind::Text,
        default: None,
        env: &[CLOUDFLARE_EMAIL, CF_API_EMAIL],
        aliases: &[CLOUDFLARE_EMAIL, CF_API_EMAIL],
        required: false,
    },
    SettingSpec {
        name: "auth_key",
        kind: SettingKind::Text,
        default: None,
        env: &[CLOUDFLARE_API_KEY, CF_API_KEY],
        aliases: &[CLOUDFLARE_API_KEY, CF_API_KEY],
        required: false,
    },
    SettingSpec {
        name: "auth_token",
        kind: SettingKind::Text,
        default: None,
        env: &[CLOUDFLARE_DNS_API_TOKEN, CF_DNS_API_TOKEN],
        aliases: &[CLOUDFLARE_DNS_API_TOKEN, CF_DNS_API_TOKEN],
        required: false,
    },
    SettingSpec {
        name: "zone_token",
        kind: SettingKind::Text,
        default: None,
        env: &[CLOUDFLARE_ZONE_API_TOKEN, CF_ZONE_API_TOKEN],
        aliases: &[CLOUDFLARE_ZONE_API_TOKEN, CF_ZONE_API_TOKEN],
        required: false,
    },
    SettingSpec {
        name: "ttl",
        kind: SettingKind::Integer,
        default: Some(SettingValue::Integer(DEFAULT_TTL)),
        env: &[CLOUDFLARE_TTL],
        aliases: &[CLOUDFLARE_TTL],
        required: false,
    },
    SettingSpec {
        name: "propagation_timeout",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_PROPAGATION_TIMEOUT)),
        env: &[CLOUDFLARE_PROPAGATION_TIMEOUT],
        aliases: &[CLOUDFLARE_PROPAGATION_TIMEOUT],
        required: false,
    },
    SettingSpec {
        name: "polling_interval",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_POLLING_INTERVAL)),
        env: &[CLOUDFLARE_POLLING_INTERVAL],
        aliases: &[CLOUDFLARE_POLLING_INTERVAL],
        required: false,
    },
    SettingSpec {
        name: "http_timeout",
        kind: SettingKind::Duration,
        default: Some(SettingValue::Duration(DEFAULT_HTTP_TIMEOUT)),
        env: &[CLOUDFLARE_HTTP_TIMEOUT],
        aliases: &[CLOUDFLARE_HTTP_TIMEOUT],
        required: false,
    },
];

/// Configuration schema of the `cloudflare` provider
pub static CLOUDFLARE_SCHEMA: ProviderSchema = ProviderSchema {
    provider: "cloudflare",
    settings: &CLOUDFLARE_SETTINGS,
};

/// How requests authenticate against the API
#[derive(Clone, PartialEq, Eq)]
pub enum CloudflareAuth {
    /// Scoped API token
    Token(String),
    /// Global API key with account email
    Key { email: String, key: String },
}

impl fmt::Debug for CloudflareAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudflareAuth::Token(_) => f.write_str("Token(<redacted>)"),
            CloudflareAuth::Key { email, .. } => f
                .debug_struct("Key")
                .field("email", email)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// Resolved `cloudflare` provider configuration
#[derive(Clone, PartialEq, Eq)]
pub struct CloudflareConfig {
    pub auth: CloudflareAuth,
    /// Token used for zone lookups, when different from the DNS token
    pub zone_token: Option<String>,
    pub ttl: u32,
    pub propagation_timeout: Duration,
    pub polling_interval: Duration,
    pub http_timeout: Duration,
    pub base_url: String,
}

impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("auth", &self.auth)
            .field("has_zone_token", &self.zone_token.is_some())
            .field("ttl", &self.ttl)
            .field("propagation_timeout", &self.propagation_timeout)
            .field("polling_interval", &self.polling_interval)
            .field("http_timeout", &self.http_timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareConfig {
    /// Token-authenticated configuration with default timings
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth: CloudflareAuth::Token(token.into()),
            zone_token: None,
            ttl: DEFAULT_TTL as u32,
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    /// Point the provider at a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the configuration from resolved settings
    ///
    /// Requires either a DNS API token, or an email together with a
    /// global API key.
    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self, ConfigError> {
        let auth = match (
            settings.text("auth_token"),
            settings.text("auth_email"),
            settings.text("auth_key"),
        ) {
            (Some(token), _, _) => CloudflareAuth::Token(token.to_string()),
            (None, Some(email), Some(key)) => CloudflareAuth::Key {
                email: email.to_string(),
                key: key.to_string(),
            },
            (None, Some(_), None) => {
                return Err(ConfigError::Missing {
                    key: CLOUDFLARE_API_KEY.to_string(),
                })
            }
            (None, None, Some(_)) => {
                return Err(ConfigError::Missing {
                    key: CLOUDFLARE_EMAIL.to_string(),
                })
            }
            (None, None, None) => {
                return Err(ConfigError::Missing {
                    key: CLOUDFLARE_DNS_API_TOKEN.to_string(),
                })
            }
        };

        let ttl = settings.integer("ttl").unwrap_or(DEFAULT_TTL);
        if ttl < MIN_TTL {
            return Err(ConfigError::Rejected {
                key: CLOUDFLARE_TTL.to_string(),
                message: format!("TTL ({}) must be greater than {}", ttl, MIN_TTL),
            });
        }
        let ttl = u32::try_from(ttl).map_err(|_| ConfigError::Rejected {
            key: CLOUDFLARE_TTL.to_string(),
            message: format!("TTL ({}) is too large", ttl),
        })?;

        Ok(Self {
            auth,
            zone_token: settings.text("zone_token").map(str::to_string),
            ttl,
            propagation_timeout: settings
                .duration("propagation_timeout")
                .unwrap_or(DEFAULT_PROPAGATION_TIMEOUT),
            polling_interval: settings
                .duration("polling_interval")
                .unwrap_or(DEFAULT_POLLING_INTERVAL),
            http_timeout: settings
                .duration("http_timeout")
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }
}

/// Cloudflare DNS provider
#[derive(Debug)]
pub struct CloudflareProvider {
    client: Client,
    config: CloudflareConfig,
    /// Challenge token -> (zone id, record id), for cleanup
    records: DashMap<String, (String, String)>,
    /// Domain -> zone id
    zone_cache: DashMap<String, String>,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    pub fn new(config: CloudflareConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| {
                ProviderError::ApiRequest(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            records: DashMap::new(),
            zone_cache: DashMap::new(),
        })
    }

    /// The provider configuration
    pub fn config(&self) -> &CloudflareConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder, zone_scope: bool) -> RequestBuilder {
        if zone_scope {
            if let Some(ref zone_token) = self.config.zone_token {
                return request.bearer_auth(zone_token);
            }
        }
        match &self.config.auth {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::Key { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    /// Find the zone managing a domain, walking up its labels
    async fn zone_id(&self, domain: &str) -> ProviderResult<String> {
        let normalized = normalize_domain(domain).trim_end_matches('.');

        if let Some(zone_id) = self.zone_cache.get(normalized) {
            trace!(domain = %domain, zone_id = %*zone_id, "Zone ID found in cache");
            return Ok(zone_id.clone());
        }

        for candidate in zone_candidates(normalized) {
            let request = self
                .client
                .get(format!("{}/zones", self.config.base_url))
                .query(&[("name", candidate), ("per_page", "1")]);
            let response = self
                .authorize(request, true)
                .send()
                .await
                .map_err(|e| ProviderError::ApiRequest(format!("Failed to list zones: {}", e)))?;

            let zones: Vec<Zone> = parse_response(response, "list zones").await?;
            if let Some(zone) = zones.into_iter().next() {
                debug!(
                    domain = %domain,
                    zone_id = %zone.id,
                    zone_name = %zone.name,
                    "Found zone for domain"
                );
                self.zone_cache.insert(normalized.to_string(), zone.id.clone());
                return Ok(zone.id);
            }
        }

        Err(ProviderError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

/// Zone name candidates from most to least specific, at least two labels
fn zone_candidates(domain: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut current = domain;
    while current.contains('.') {
        candidates.push(current);
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => break,
        }
    }
    candidates
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> ProviderResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Authentication(format!(
            "Failed to {}: HTTP {}",
            operation, status
        )));
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
        ProviderError::ApiRequest(format!(
            "Failed to {}: HTTP {} - invalid response: {}",
            operation, status, e
        ))
    })?;

    if !status.is_success() || !parsed.success {
        let messages: Vec<String> = parsed
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        return Err(ProviderError::ApiRequest(format!(
            "Failed to {}: HTTP {} - {}",
            operation,
            status,
            messages.join("; ")
        )));
    }

    parsed.result.ok_or_else(|| {
        ProviderError::ApiRequest(format!("Failed to {}: empty result", operation))
    })
}

#[async_trait]
impl ChallengeProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        let record = challenge_record(domain, key_authorization);
        let zone_id = self.zone_id(domain).await?;

        debug!(
            domain = %domain,
            zone_id = %zone_id,
            record_name = %record.fqdn,
            "Creating TXT record"
        );

        let body = CreateRecordRequest {
            r#type: "TXT",
            name: &record.fqdn,
            content: &record.value,
            ttl: self.config.ttl,
        };
        let request = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.config.base_url, zone_id))
            .json(&body);
        let response = self
            .authorize(request, false)
            .send()
            .await
            .map_err(|e| ProviderError::RecordCreation {
                record_name: record.fqdn.clone(),
                message: e.to_string(),
            })?;

        let created: DnsRecord = parse_response(response, "create record")
            .await
            .map_err(|e| match e {
                ProviderError::Authentication(_) => e,
                other => ProviderError::RecordCreation {
                    record_name: record.fqdn.clone(),
                    message: other.to_string(),
                },
            })?;

        debug!(record_id = %created.id, "TXT record created successfully");
        self.records
            .insert(token.to_string(), (zone_id, created.id));
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ProviderResult<()> {
        let Some((_, (zone_id, record_id))) = self.records.remove(token) else {
            return Err(ProviderError::UnknownRecord(
                challenge_record(domain, key_authorization).fqdn,
            ));
        };

        debug!(record_id = %record_id, "Deleting TXT record");

        let request = self.client.delete(format!(
            "{}/zones/{}/dns_records/{}",
            self.config.base_url, zone_id, record_id
        ));
        let response = self
            .authorize(request, false)
            .send()
            .await
            .map_err(|e| ProviderError::RecordDeletion {
                record_id: record_id.clone(),
                message: e.to_string(),
            })?;

        // 404 is fine - record might already be deleted
        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RecordDeletion {
                record_id,
                message: format!("HTTP {} - {}", status, body),
            });
        }

        debug!(record_id = %record_id, "TXT record deleted successfully");
        Ok(())
    }

    fn timeout(&self) -> Option<(Duration, Duration)> {
        Some((self.config.propagation_timeout, self.config.polling_interval))
    }
}

pub(crate) fn build(
    settings: &ResolvedSettings,
) -> Result<Arc<dyn ChallengeProvider>, ConfigError> {
    let config = CloudflareConfig::from_settings(settings)?;
    let provider = CloudflareProvider::new(config).map_err(|e| ConfigError::Rejected {
        key: CLOUDFLARE_HTTP_TIMEOUT.to_string(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(provider))
}

// Cloudflare API types

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}
