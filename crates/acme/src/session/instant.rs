//! ACME session backed by `instant-acme`
//!
//! Drives one order from creation to a signed certificate:
//!
//! 1. Create the order for every requested name
//! 2. For each pending authorization, pick the first challenge the server
//!    offers that has a registered backend, present it and mark it ready
//! 3. Poll the order until it is ready, then clean up every presented
//!    challenge whatever the outcome
//! 4. Finalize with a fresh key pair and CSR, then poll for the certificate

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewOrder, Order,
    OrderStatus,
};
use rcgen::{CertificateParams, KeyPair};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    AcmeSession, CertificateBundle, Dns01Options, ObtainRequest, SessionProvider, SessionSettings,
};
use crate::challenge::{ChallengeKind, ChallengeProvider};
use crate::dns::{challenge_record, PropagationChecker, PropagationConfig};
use crate::error::{AcmeError, RegistrationError};

/// An ACME account restored from stored credentials
///
/// Every call to [`SessionProvider::session`] yields an independent
/// [`InstantAcmeSession`] sharing this account.
#[derive(Clone)]
pub struct AcmeAccount {
    account: Arc<Account>,
    settings: SessionSettings,
}

impl std::fmt::Debug for AcmeAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeAccount")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AcmeAccount {
    /// Wrap an already loaded account
    pub fn new(account: Account, settings: SessionSettings) -> Self {
        Self {
            account: Arc::new(account),
            settings,
        }
    }

    /// Restore the account from its JSON credentials
    pub async fn from_credentials_json(
        json: &str,
        settings: SessionSettings,
    ) -> Result<Self, AcmeError> {
        let credentials: AccountCredentials = serde_json::from_str(json).map_err(|e| {
            AcmeError::Session(format!("Failed to parse account credentials: {}", e))
        })?;
        let account = Account::from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::Session(format!("Failed to restore account: {}", e)))?;

        debug!("Restored ACME account from credentials");
        Ok(Self::new(account, settings))
    }

    /// Session timing settings
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

#[async_trait]
impl SessionProvider for AcmeAccount {
    async fn session(&self) -> Result<Box<dyn AcmeSession>, AcmeError> {
        Ok(Box::new(InstantAcmeSession::new(
            Arc::clone(&self.account),
            self.settings.clone(),
        )))
    }
}

/// A challenge presented on some backend, awaiting cleanup
struct Presented {
    provider: Arc<dyn ChallengeProvider>,
    domain: String,
    token: String,
    key_authorization: String,
}

/// Challenges presented during one order, in presentation order
#[derive(Default)]
struct PresentedChallenges {
    presented: Vec<Presented>,
    pause: Option<Duration>,
}

impl PresentedChallenges {
    /// Present one challenge and remember it for cleanup
    ///
    /// When the previous backend solves challenges one at a time, its
    /// sequence interval elapses first.
    async fn present(
        &mut self,
        provider: &Arc<dyn ChallengeProvider>,
        domain: &str,
        token: &str,
        key_authorization: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AcmeError> {
        if let Some(interval) = self.pause.take() {
            debug!(
                domain = %domain,
                interval_secs = interval.as_secs(),
                "Waiting before next sequential challenge"
            );
            sleep_or_cancel(interval, cancel).await?;
        }

        provider
            .present(domain, token, key_authorization)
            .await
            .map_err(|source| AcmeError::Challenge {
                domain: domain.to_string(),
                source,
            })?;
        self.presented.push(Presented {
            provider: Arc::clone(provider),
            domain: domain.to_string(),
            token: token.to_string(),
            key_authorization: key_authorization.to_string(),
        });
        self.pause = provider.sequence_interval();
        Ok(())
    }

    /// Clean up every presented challenge
    ///
    /// Failures are logged and do not stop the remaining cleanups.
    async fn cleanup(self) {
        for challenge in self.presented {
            if let Err(e) = challenge
                .provider
                .cleanup(&challenge.domain, &challenge.token, &challenge.key_authorization)
                .await
            {
                warn!(
                    domain = %challenge.domain,
                    backend = challenge.provider.name(),
                    error = %e,
                    "Failed to clean up challenge"
                );
            }
        }
    }
}

/// One ACME acquisition over an `instant-acme` account
pub struct InstantAcmeSession {
    account: Arc<Account>,
    settings: SessionSettings,
    dns01: Option<(Arc<dyn ChallengeProvider>, Dns01Options)>,
    http01: Option<Arc<dyn ChallengeProvider>>,
    tls_alpn01: Option<Arc<dyn ChallengeProvider>>,
}

impl std::fmt::Debug for InstantAcmeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantAcmeSession")
            .field("settings", &self.settings)
            .field("dns01", &self.dns01.as_ref().map(|(p, o)| (p.name(), o)))
            .field("http01", &self.http01.as_ref().map(|p| p.name()))
            .field("tls_alpn01", &self.tls_alpn01.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl InstantAcmeSession {
    /// Create a session with no registered backends
    pub fn new(account: Arc<Account>, settings: SessionSettings) -> Self {
        Self {
            account,
            settings,
            dns01: None,
            http01: None,
            tls_alpn01: None,
        }
    }

    /// Challenge types with a registered backend
    pub fn registered(&self) -> Vec<ChallengeKind> {
        let mut kinds = Vec::new();
        if self.dns01.is_some() {
            kinds.push(ChallengeKind::Dns01);
        }
        if self.http01.is_some() {
            kinds.push(ChallengeKind::Http01);
        }
        if self.tls_alpn01.is_some() {
            kinds.push(ChallengeKind::TlsAlpn01);
        }
        kinds
    }

    fn backend(&self, kind: ChallengeKind) -> Option<&Arc<dyn ChallengeProvider>> {
        match kind {
            ChallengeKind::Dns01 => self.dns01.as_ref().map(|(p, _)| p),
            ChallengeKind::Http01 => self.http01.as_ref(),
            ChallengeKind::TlsAlpn01 => self.tls_alpn01.as_ref(),
        }
    }

    /// Present and validate every pending authorization of the order
    async fn authorize(
        &self,
        order: &mut Order,
        presented: &mut PresentedChallenges,
        cancel: &CancellationToken,
    ) -> Result<(), AcmeError> {
        let authorizations = order.authorizations().await?;
        let registered = self.registered();

        for authz in authorizations {
            if authz.status == AuthorizationStatus::Valid {
                continue;
            }
            let Identifier::Dns(domain) = &authz.identifier;

            let offered = authz.challenges.iter().map(|c| &c.r#type);
            let (index, kind) = select_challenge(domain, offered, &registered)?;
            let challenge = &authz.challenges[index];
            let provider = self
                .backend(kind)
                .ok_or_else(|| AcmeError::Acquisition(format!("no {} backend registered", kind)))?;

            let key_authorization = order.key_authorization(challenge).as_str().to_string();
            info!(
                domain = %domain,
                challenge = %kind,
                backend = provider.name(),
                "Presenting challenge"
            );
            presented
                .present(provider, domain, &challenge.token, &key_authorization, cancel)
                .await?;

            if kind == ChallengeKind::Dns01 {
                self.wait_for_propagation(provider.as_ref(), domain, &key_authorization, cancel)
                    .await?;
            }

            order.set_challenge_ready(&challenge.url).await?;
            debug!(domain = %domain, challenge = %kind, "Challenge marked ready");
        }

        self.wait_for_order_ready(order, cancel).await
    }

    async fn wait_for_propagation(
        &self,
        provider: &dyn ChallengeProvider,
        domain: &str,
        key_authorization: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AcmeError> {
        let options = self
            .dns01
            .as_ref()
            .map(|(_, options)| options.clone())
            .unwrap_or_default();
        let (timeout, polling_interval) = provider
            .timeout()
            .unwrap_or_else(|| self.settings.propagation());

        let checker = PropagationChecker::new(PropagationConfig {
            timeout,
            polling_interval,
            nameservers: options.recursive_nameservers,
            require_authoritative: !options.disable_complete_propagation,
        })
        .await
        .map_err(|source| AcmeError::Challenge {
            domain: domain.to_string(),
            source,
        })?;

        let record = challenge_record(domain, key_authorization);
        checker.wait_for_record(domain, &record, cancel).await
    }

    async fn wait_for_order_ready(
        &self,
        order: &mut Order,
        cancel: &CancellationToken,
    ) -> Result<(), AcmeError> {
        let deadline = Instant::now() + self.settings.order_timeout();
        loop {
            let state = order.refresh().await?;
            debug!(status = ?state.status, "Order status");

            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    let detail = state
                        .error
                        .as_ref()
                        .map(|e| format!("{:?}", e))
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(AcmeError::Acquisition(format!(
                        "order became invalid: {}",
                        detail
                    )));
                }
                OrderStatus::Pending | OrderStatus::Processing => {}
            }

            if Instant::now() >= deadline {
                return Err(AcmeError::Acquisition(format!(
                    "authorizations not valid after {}s",
                    self.settings.order_timeout_secs
                )));
            }
            sleep_or_cancel(self.settings.poll_interval(), cancel).await?;
        }
    }

    /// Finalize the order and wait for the certificate chain
    async fn finalize(
        &self,
        order: &mut Order,
        domains: &[String],
        cancel: &CancellationToken,
    ) -> Result<(String, KeyPair), AcmeError> {
        let key_pair = KeyPair::generate()
            .map_err(|e| AcmeError::Acquisition(format!("Failed to generate key pair: {}", e)))?;
        let csr = CertificateParams::new(domains.to_vec())
            .map_err(|e| AcmeError::Acquisition(format!("Invalid certificate names: {}", e)))?
            .serialize_request(&key_pair)
            .map_err(|e| AcmeError::Acquisition(format!("Failed to create CSR: {}", e)))?
            .der()
            .to_vec();

        if order.state().status != OrderStatus::Valid {
            order.finalize(&csr).await?;
            debug!("Order finalized, waiting for certificate");
        }

        let deadline = Instant::now() + self.settings.finalize_timeout();
        loop {
            if let Some(chain) = order.certificate().await? {
                return Ok((chain, key_pair));
            }
            if Instant::now() >= deadline {
                return Err(AcmeError::Acquisition(format!(
                    "certificate not issued after {}s",
                    self.settings.finalize_timeout_secs
                )));
            }
            sleep_or_cancel(self.settings.poll_interval(), cancel).await?;
        }
    }
}

#[async_trait]
impl AcmeSession for InstantAcmeSession {
    fn set_dns01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
        options: Dns01Options,
    ) -> Result<(), RegistrationError> {
        self.dns01 = Some((provider, options));
        Ok(())
    }

    fn set_http01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
    ) -> Result<(), RegistrationError> {
        self.http01 = Some(provider);
        Ok(())
    }

    fn set_tls_alpn01_provider(
        &mut self,
        provider: Arc<dyn ChallengeProvider>,
    ) -> Result<(), RegistrationError> {
        self.tls_alpn01 = Some(provider);
        Ok(())
    }

    async fn obtain(
        &mut self,
        request: ObtainRequest,
        cancel: CancellationToken,
    ) -> Result<CertificateBundle, AcmeError> {
        let primary = request.domains.first().cloned().ok_or(AcmeError::NoDomains)?;
        if cancel.is_cancelled() {
            return Err(AcmeError::Cancelled);
        }
        if self.registered().is_empty() {
            return Err(AcmeError::Acquisition("no challenge backend registered".to_string()));
        }

        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut order = self
            .account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;
        info!(domain = %primary, names = request.domains.len(), "Created ACME order");

        let mut presented = PresentedChallenges::default();
        let authorized = self.authorize(&mut order, &mut presented, &cancel).await;
        presented.cleanup().await;
        authorized?;

        let (chain, key_pair) = self.finalize(&mut order, &request.domains, &cancel).await?;
        let (leaf, issuer) = split_chain(&chain);
        info!(domain = %primary, "Certificate issued");

        Ok(CertificateBundle {
            domain: primary,
            certificate_url: order.url().to_string(),
            private_key_pem: key_pair.serialize_pem(),
            certificate_pem: if request.bundle { chain } else { leaf },
            issuer_certificate_pem: issuer,
        })
    }
}

/// Pick the first challenge the server offers that has a registered backend
///
/// Returns the position of the chosen challenge in the server's list.
fn select_challenge<'a, I>(
    domain: &str,
    offered: I,
    registered: &[ChallengeKind],
) -> Result<(usize, ChallengeKind), AcmeError>
where
    I: IntoIterator<Item = &'a ChallengeType>,
{
    let offered: Vec<&ChallengeType> = offered.into_iter().collect();
    offered
        .iter()
        .enumerate()
        .find_map(|(index, challenge_type)| {
            challenge_kind(challenge_type)
                .filter(|kind| registered.contains(kind))
                .map(|kind| (index, kind))
        })
        .ok_or_else(|| {
            AcmeError::Acquisition(format!(
                "no registered challenge type for '{}', server offered {:?}",
                domain, offered
            ))
        })
}

fn challenge_kind(challenge_type: &ChallengeType) -> Option<ChallengeKind> {
    match challenge_type {
        ChallengeType::Dns01 => Some(ChallengeKind::Dns01),
        ChallengeType::Http01 => Some(ChallengeKind::Http01),
        ChallengeType::TlsAlpn01 => Some(ChallengeKind::TlsAlpn01),
        _ => None,
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), AcmeError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AcmeError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Split a PEM chain into the leaf and the remaining issuer certificates
fn split_chain(chain: &str) -> (String, Option<String>) {
    const END: &str = "-----END CERTIFICATE-----";
    match chain.find(END) {
        Some(pos) => {
            let (leaf, rest) = chain.split_at(pos + END.len());
            let rest = rest.trim_start();
            let issuer = (!rest.is_empty()).then(|| rest.to_string());
            (format!("{}\n", leaf), issuer)
        }
        None => (chain.to_string(), None),
    }
}
