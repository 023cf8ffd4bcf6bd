//! Certificate acquisition entry point

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::challenge::ChallengeHost;
use crate::config::{Environment, ProcessEnvironment};
use crate::dns::ProviderRegistry;
use crate::error::AcmeError;
use crate::orchestrator::ChallengeOrchestrator;
use crate::policy::AccountPolicy;
use crate::session::{CertificateBundle, ObtainRequest, SessionProvider};

/// Obtains certificates for an account
///
/// Each call to [`obtain`](Self::obtain) opens its own session and builds
/// its own backends, so concurrent acquisitions share no mutable state.
/// Errors are returned as produced; nothing is retried here.
#[derive(Clone)]
pub struct CertificateAcquirer {
    sessions: Arc<dyn SessionProvider>,
    host: Arc<dyn ChallengeHost>,
    environment: Arc<dyn Environment>,
    registry: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for CertificateAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAcquirer")
            .field("environment", &self.environment)
            .field("providers", &self.registry.identifiers())
            .finish_non_exhaustive()
    }
}

impl CertificateAcquirer {
    /// Acquirer using the built-in DNS providers and the process environment
    pub fn new(sessions: Arc<dyn SessionProvider>, host: Arc<dyn ChallengeHost>) -> Self {
        Self {
            sessions,
            host,
            environment: Arc::new(ProcessEnvironment),
            registry: Arc::new(ProviderRegistry::builtin().clone()),
        }
    }

    /// Resolve provider configuration against another environment
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Use another DNS provider registry
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Obtain a bundled certificate covering every name
    ///
    /// Opens a session, registers the challenge backends the policy enables
    /// and issues a single certificate request. `cancel` is handed to the
    /// session unchanged.
    #[instrument(
        skip(self, policy, cancel),
        fields(domain = names.first().map(String::as_str).unwrap_or(""))
    )]
    pub async fn obtain(
        &self,
        names: &[String],
        policy: &AccountPolicy,
        cancel: CancellationToken,
    ) -> Result<CertificateBundle, AcmeError> {
        if names.is_empty() {
            return Err(AcmeError::NoDomains);
        }

        let mut session = self.sessions.session().await?;

        ChallengeOrchestrator::new(&self.registry, self.environment.as_ref(), self.host.as_ref())
            .setup(session.as_mut(), policy)?;

        let request = ObtainRequest {
            domains: names.to_vec(),
            bundle: true,
        };
        match session.obtain(request, cancel).await {
            Ok(bundle) => {
                info!(names = names.len(), "Certificate obtained");
                Ok(bundle)
            }
            Err(e) => {
                warn!(error = %e, "Certificate acquisition failed");
                Err(e)
            }
        }
    }
}
