//! ACME acquisition error types

use std::num::ParseIntError;

use thiserror::Error;

use crate::challenge::ChallengeKind;

/// Errors produced while parsing a raw configuration value
///
/// Parse errors carry no key; the resolver wraps them in
/// [`ConfigError::Invalid`] together with the key that held the value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty value")]
    Empty,

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {value:?}")]
    UnknownUnit { unit: String, value: String },

    #[error("negative duration {0:?}")]
    NegativeDuration(String),

    #[error("duration {0:?} out of range")]
    DurationOverflow(String),

    #[error("invalid integer: {0}")]
    InvalidInteger(#[from] ParseIntError),
}

/// A malformed, missing, or rejected configuration value
///
/// Every variant names the configuration key it refers to.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was supplied by no source
    #[error("some credentials information are missing: {key}")]
    Missing { key: String },

    /// A value was present but could not be parsed
    #[error("failed to parse '{key}': {source}")]
    Invalid {
        key: String,
        #[source]
        source: ParseError,
    },

    /// A value parsed but is not acceptable to the provider
    #[error("invalid value for '{key}': {message}")]
    Rejected { key: String, message: String },
}

impl ConfigError {
    /// The configuration key this error refers to
    pub fn key(&self) -> &str {
        match self {
            ConfigError::Missing { key }
            | ConfigError::Invalid { key, .. }
            | ConfigError::Rejected { key, .. } => key,
        }
    }
}

/// An ACME session refused a challenge backend
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A recursive nameserver could not be used for propagation checks
    #[error("invalid nameserver '{0}'")]
    InvalidNameserver(String),

    /// The session cannot accept backends any more
    #[error("session is closed")]
    Closed,

    /// Any other refusal reported by the session implementation
    #[error("{0}")]
    Rejected(String),
}

/// Errors reported by a challenge backend while solving a challenge
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication with the DNS API failed
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// No zone manages the domain
    #[error("zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// Record creation failed
    #[error("failed to create TXT record '{record_name}': {message}")]
    RecordCreation {
        record_name: String,
        message: String,
    },

    /// Record deletion failed
    #[error("failed to delete TXT record '{record_id}': {message}")]
    RecordDeletion { record_id: String, message: String },

    /// Cleanup was requested for a challenge this backend never presented
    #[error("unknown record ID for '{0}'")]
    UnknownRecord(String),

    /// API request failed
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// A DNS query or resolver setup failed
    #[error("DNS lookup failed for '{name}': {message}")]
    Lookup { name: String, message: String },

    /// External program failed
    #[error("command '{program}' failed: {message}")]
    Command { program: String, message: String },

    /// Challenge certificate generation failed
    #[error("failed to generate challenge certificate: {0}")]
    Certificate(String),

    /// Record did not become visible in time
    #[error("DNS propagation timeout for '{record}': {message}")]
    Propagation { record: String, message: String },
}

/// Top-level error returned by certificate acquisition
#[derive(Debug, Error)]
pub enum AcmeError {
    /// A provider's configuration could not be resolved
    #[error("{provider}: {source}")]
    Configuration {
        provider: String,
        #[source]
        source: ConfigError,
    },

    /// The requested DNS provider identifier is not registered
    #[error("provider {0} is not supported")]
    UnsupportedProvider(String),

    /// A challenge backend could not be registered on the session
    #[error("failed to register {challenge} provider: {source}")]
    Registration {
        challenge: ChallengeKind,
        #[source]
        source: RegistrationError,
    },

    /// No ACME session could be opened for the account
    #[error("failed to open ACME session: {0}")]
    Session(String),

    /// The ACME exchange failed
    #[error("certificate acquisition failed: {0}")]
    Acquisition(String),

    /// A challenge backend failed while solving a challenge
    #[error("challenge failed for domain '{domain}': {source}")]
    Challenge {
        domain: String,
        #[source]
        source: ProviderError,
    },

    /// The request named no domains
    #[error("at least one domain name is required")]
    NoDomains,

    /// The caller cancelled the acquisition
    #[error("certificate acquisition cancelled")]
    Cancelled,
}

impl AcmeError {
    /// The configuration key behind a configuration error, if any
    pub fn config_key(&self) -> Option<&str> {
        match self {
            AcmeError::Configuration { source, .. } => Some(source.key()),
            _ => None,
        }
    }
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        AcmeError::Acquisition(e.to_string())
    }
}
