//! Challenge registration
//!
//! Registers the challenge backends an account policy enables on an ACME
//! session, in a fixed order: DNS-01, HTTP-01, TLS-ALPN-01. The first
//! failure aborts setup and later challenge types are not attempted.
//! Setup only hands backend references to the session; it issues no network
//! traffic.

use tracing::{debug, info};

use crate::challenge::{ChallengeHost, ChallengeKind};
use crate::config::Environment;
use crate::dns::ProviderRegistry;
use crate::error::AcmeError;
use crate::policy::AccountPolicy;
use crate::session::{AcmeSession, Dns01Options};

/// Registers challenge backends for one acquisition
#[derive(Clone, Copy)]
pub struct ChallengeOrchestrator<'a> {
    registry: &'a ProviderRegistry,
    env: &'a dyn Environment,
    host: &'a dyn ChallengeHost,
}

impl<'a> ChallengeOrchestrator<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        env: &'a dyn Environment,
        host: &'a dyn ChallengeHost,
    ) -> Self {
        Self {
            registry,
            env,
            host,
        }
    }

    /// Register every backend the policy enables
    ///
    /// Returns the registered challenge types in registration order.
    pub fn setup(
        &self,
        session: &mut dyn AcmeSession,
        policy: &AccountPolicy,
    ) -> Result<Vec<ChallengeKind>, AcmeError> {
        let mut registered = Vec::new();

        if policy.dns01_enabled() {
            let provider = self
                .registry
                .build(&policy.provider, self.env, &policy.provider_configuration)?;
            let options = dns01_options(policy)?;

            debug!(
                provider = %policy.provider,
                resolvers = options.recursive_nameservers.len(),
                disable_complete_propagation = options.disable_complete_propagation,
                "Registering DNS-01 provider"
            );
            session
                .set_dns01_provider(provider, options)
                .map_err(|source| AcmeError::Registration {
                    challenge: ChallengeKind::Dns01,
                    source,
                })?;
            registered.push(ChallengeKind::Dns01);
        }

        if policy.enable_http01 {
            session
                .set_http01_provider(self.host.http01_provider())
                .map_err(|source| AcmeError::Registration {
                    challenge: ChallengeKind::Http01,
                    source,
                })?;
            registered.push(ChallengeKind::Http01);
        }

        if policy.enable_tls_alpn01 {
            session
                .set_tls_alpn01_provider(self.host.tls_alpn01_provider())
                .map_err(|source| AcmeError::Registration {
                    challenge: ChallengeKind::TlsAlpn01,
                    source,
                })?;
            registered.push(ChallengeKind::TlsAlpn01);
        }

        let names: Vec<_> = registered.iter().map(ChallengeKind::as_str).collect();
        info!(challenges = ?names, "Registered challenge providers");
        Ok(registered)
    }
}

/// DNS-01 options derived from the policy
///
/// Each option is applied only when the policy asks for it.
fn dns01_options(policy: &AccountPolicy) -> Result<Dns01Options, AcmeError> {
    let mut options = Dns01Options::default();
    if !policy.dns_resolvers.is_empty() {
        options = options
            .with_recursive_nameservers(&policy.dns_resolvers)
            .map_err(|source| AcmeError::Registration {
                challenge: ChallengeKind::Dns01,
                source,
            })?;
    }
    if policy.ignore_dns_propagation {
        options = options.with_complete_propagation_disabled();
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::challenge::{ChallengeProvider, SharedChallengeStores};
    use crate::config::StaticEnvironment;
    use crate::error::RegistrationError;
    use crate::session::{CertificateBundle, ObtainRequest};

    #[derive(Default)]
    struct RecordingSession {
        calls: Vec<(ChallengeKind, &'static str, Option<Dns01Options>)>,
        reject: Option<ChallengeKind>,
    }

    impl RecordingSession {
        fn record(
            &mut self,
            kind: ChallengeKind,
            provider: Arc<dyn ChallengeProvider>,
            options: Option<Dns01Options>,
        ) -> Result<(), RegistrationError> {
            if self.reject == Some(kind) {
                return Err(RegistrationError::Rejected("refused".to_string()));
            }
            self.calls.push((kind, provider.name(), options));
            Ok(())
        }
    }

    #[async_trait]
    impl AcmeSession for RecordingSession {
        fn set_dns01_provider(
            &mut self,
            provider: Arc<dyn ChallengeProvider>,
            options: Dns01Options,
        ) -> Result<(), RegistrationError> {
            self.record(ChallengeKind::Dns01, provider, Some(options))
        }

        fn set_http01_provider(
            &mut self,
            provider: Arc<dyn ChallengeProvider>,
        ) -> Result<(), RegistrationError> {
            self.record(ChallengeKind::Http01, provider, None)
        }

        fn set_tls_alpn01_provider(
            &mut self,
            provider: Arc<dyn ChallengeProvider>,
        ) -> Result<(), RegistrationError> {
            self.record(ChallengeKind::TlsAlpn01, provider, None)
        }

        async fn obtain(
            &mut self,
            _request: ObtainRequest,
            _cancel: CancellationToken,
        ) -> Result<CertificateBundle, AcmeError> {
            Err(AcmeError::Acquisition("not used".to_string()))
        }
    }

    fn exec_policy() -> AccountPolicy {
        AccountPolicy::new()
            .with_dns_provider("exec")
            .with_provider_setting("EXEC_PATH", "/usr/local/bin/dns-hook")
    }

    fn setup(
        session: &mut RecordingSession,
        policy: &AccountPolicy,
    ) -> Result<Vec<ChallengeKind>, AcmeError> {
        let env = StaticEnvironment::new();
        let host = SharedChallengeStores::new();
        ChallengeOrchestrator::new(ProviderRegistry::builtin(), &env, &host).setup(session, policy)
    }

    #[test]
    fn test_http01_only() {
        let mut session = RecordingSession::default();
        let policy = AccountPolicy::new().with_http01(true);

        let registered = setup(&mut session, &policy).unwrap();

        assert_eq!(registered, vec![ChallengeKind::Http01]);
        assert_eq!(session.calls.len(), 1);
        assert_eq!(session.calls[0].1, "http-01");
    }

    #[test]
    fn test_all_challenges_in_order() {
        let mut session = RecordingSession::default();
        let policy = exec_policy().with_http01(true).with_tls_alpn01(true);

        let registered = setup(&mut session, &policy).unwrap();

        let expected = vec![ChallengeKind::Dns01, ChallengeKind::Http01, ChallengeKind::TlsAlpn01];
        assert_eq!(registered, expected);
        let kinds: Vec<_> = session.calls.iter().map(|c| c.0).collect();
        assert_eq!(kinds, expected);
        assert_eq!(session.calls[0].1, "exec");
    }

    #[test]
    fn test_nothing_enabled() {
        let mut session = RecordingSession::default();
        let registered = setup(&mut session, &AccountPolicy::default()).unwrap();
        assert!(registered.is_empty());
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_dns_options_applied_independently() {
        let cases = [
            (vec![], false, Dns01Options::default()),
            (
                vec!["8.8.8.8".to_string()],
                false,
                Dns01Options {
                    recursive_nameservers: vec!["8.8.8.8:53".to_string()],
                    disable_complete_propagation: false,
                },
            ),
            (
                vec![],
                true,
                Dns01Options {
                    recursive_nameservers: vec![],
                    disable_complete_propagation: true,
                },
            ),
            (
                vec!["1.1.1.1:5353".to_string()],
                true,
                Dns01Options {
                    recursive_nameservers: vec!["1.1.1.1:5353".to_string()],
                    disable_complete_propagation: true,
                },
            ),
        ];

        for (resolvers, ignore, expected) in cases {
            let mut session = RecordingSession::default();
            let policy = exec_policy()
                .with_dns_resolvers(resolvers)
                .with_ignore_dns_propagation(ignore);

            setup(&mut session, &policy).unwrap();
            assert_eq!(session.calls[0].2.as_ref(), Some(&expected));
        }
    }

    #[test]
    fn test_dns_failure_stops_later_registrations() {
        let mut session = RecordingSession::default();
        let policy = AccountPolicy::new()
            .with_dns_provider("route53")
            .with_http01(true)
            .with_tls_alpn01(true);

        let err = setup(&mut session, &policy).unwrap_err();
        assert!(matches!(err, AcmeError::UnsupportedProvider(ref id) if id == "route53"));
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_invalid_resolver_is_registration_error() {
        let mut session = RecordingSession::default();
        let policy = exec_policy().with_dns_resolvers(["bad host"]).with_http01(true);

        let err = setup(&mut session, &policy).unwrap_err();
        assert!(matches!(
            err,
            AcmeError::Registration {
                challenge: ChallengeKind::Dns01,
                source: RegistrationError::InvalidNameserver(_),
            }
        ));
        assert!(session.calls.is_empty());
    }

    #[test]
    fn test_rejected_registration_is_fail_fast() {
        let mut session = RecordingSession {
            reject: Some(ChallengeKind::Http01),
            ..Default::default()
        };
        let policy = exec_policy().with_http01(true).with_tls_alpn01(true);

        let err = setup(&mut session, &policy).unwrap_err();
        assert!(matches!(
            err,
            AcmeError::Registration {
                challenge: ChallengeKind::Http01,
                ..
            }
        ));
        let kinds: Vec<_> = session.calls.iter().map(|c| c.0).collect();
        assert_eq!(kinds, vec![ChallengeKind::Dns01]);
    }

    #[test]
    fn test_configuration_error_names_key() {
        let mut session = RecordingSession::default();
        let policy = AccountPolicy::new()
            .with_dns_provider("cloudflare")
            .with_provider_setting("CF_DNS_API_TOKEN", "tok123")
            .with_provider_setting("CLOUDFLARE_TTL", "abc");

        let err = setup(&mut session, &policy).unwrap_err();
        assert_eq!(err.config_key(), Some("CLOUDFLARE_TTL"));
        assert!(session.calls.is_empty());
    }
}
