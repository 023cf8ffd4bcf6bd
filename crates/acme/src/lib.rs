//! Certward ACME Library
//!
//! Certificate acquisition over ACME with layered DNS provider configuration
//! and multi-challenge orchestration.
//!
//! - **Configuration**: provider settings resolved from defaults, the process
//!   environment and per-account overrides with aliased keys
//! - **DNS-01 providers**: a registry of backends (Cloudflare, external program)
//!   built from resolved configuration
//! - **Challenge orchestration**: DNS-01, HTTP-01 and TLS-ALPN-01 backends
//!   registered on an ACME session according to the account policy
//! - **Acquisition**: a single entry point that opens a session, registers
//!   challenges and obtains a bundled certificate
//!
//! # Challenge Flow
//!
//! ```text
//! CertificateAcquirer::obtain
//!     -> SessionProvider::session
//!     -> ChallengeOrchestrator::setup   (DNS-01, HTTP-01, TLS-ALPN-01)
//!     -> AcmeSession::obtain            (order, present, validate, finalize)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certward_acme::{
//!     AccountPolicy, AcmeAccount, CertificateAcquirer, SessionSettings, SharedChallengeStores,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = SessionSettings::default();
//! let account = AcmeAccount::from_credentials_json(&credentials, settings).await?;
//! let stores = SharedChallengeStores::new();
//! let acquirer = CertificateAcquirer::new(Arc::new(account), Arc::new(stores.clone()));
//!
//! let policy = AccountPolicy::new()
//!     .with_dns_provider("cloudflare")
//!     .with_provider_setting("CF_DNS_API_TOKEN", token)
//!     .with_http01(true);
//!
//! let names = vec!["example.com".to_string(), "*.example.com".to_string()];
//! let bundle = acquirer.obtain(&names, &policy, CancellationToken::new()).await?;
//! ```

pub mod challenge;
pub mod config;
pub mod dns;
pub mod driver;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod session;

pub use challenge::{
    ChallengeHost, ChallengeKind, ChallengeProvider, Http01ChallengeStore, SharedChallengeStores,
    TlsAlpn01ChallengeStore,
};
pub use config::{Environment, ProcessEnvironment, StaticEnvironment};
pub use dns::{build_provider, ProviderRegistry};
pub use driver::CertificateAcquirer;
pub use error::{AcmeError, ConfigError, ParseError, ProviderError, RegistrationError};
pub use logging::{init_tracing, LogFormat};
pub use orchestrator::ChallengeOrchestrator;
pub use policy::AccountPolicy;
pub use session::{
    AcmeAccount, AcmeSession, CertificateBundle, Dns01Options, InstantAcmeSession, ObtainRequest,
    SessionProvider, SessionSettings,
};
