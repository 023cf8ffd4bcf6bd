//! DNS propagation checking for DNS-01 challenges
//!
//! Verifies that a challenge TXT record is visible before the ACME server is
//! told to validate it. The record is first looked up through the recursive
//! nameservers (the configured ones, or the system resolver); unless disabled,
//! every authoritative nameserver of the record's zone must then serve it too.

use std::net::SocketAddr;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::dns::{ChallengeRecord, DEFAULT_POLLING_INTERVAL, DEFAULT_PROPAGATION_TIMEOUT};
use crate::error::{AcmeError, ProviderError};

/// Propagation check settings for one challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationConfig {
    /// Maximum time to wait for the record
    pub timeout: Duration,
    /// Interval between checks
    pub polling_interval: Duration,
    /// Recursive nameservers as `host:port` (empty = system resolver)
    pub nameservers: Vec<String>,
    /// Also require every authoritative nameserver to serve the record
    pub require_authoritative: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            nameservers: Vec::new(),
            require_authoritative: true,
        }
    }
}

/// DNS propagation checker
#[derive(Debug)]
pub struct PropagationChecker {
    config: PropagationConfig,
    resolver: TokioAsyncResolver,
}

impl PropagationChecker {
    /// Create a checker, resolving the configured nameserver addresses
    pub async fn new(config: PropagationConfig) -> Result<Self, ProviderError> {
        let resolver = if config.nameservers.is_empty() {
            TokioAsyncResolver::tokio_from_system_conf().map_err(|e| ProviderError::Lookup {
                name: "system resolver configuration".to_string(),
                message: e.to_string(),
            })?
        } else {
            let mut addrs = Vec::new();
            for nameserver in &config.nameservers {
                addrs.extend(nameserver_addrs(nameserver).await?);
            }
            resolver_for(&addrs)
        };

        Ok(Self { config, resolver })
    }

    /// The checker configuration
    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Wait until the challenge record for `domain` carries its value
    ///
    /// Every lookup is bounded by the propagation timeout. Fails with
    /// [`AcmeError::Cancelled`] when the token fires and with a propagation
    /// error once the timeout elapses.
    pub async fn wait_for_record(
        &self,
        domain: &str,
        record: &ChallengeRecord,
        cancel: &CancellationToken,
    ) -> Result<(), AcmeError> {
        let fqdn = record.fqdn.as_str();
        let start = Instant::now();
        let deadline = start + self.config.timeout;

        debug!(
            domain = %domain,
            record = %fqdn,
            timeout_secs = self.config.timeout.as_secs(),
            authoritative = self.config.require_authoritative,
            "Waiting for DNS propagation"
        );

        loop {
            let bounded = tokio::time::timeout_at(deadline, self.check(fqdn, &record.value));
            let checked = tokio::select! {
                _ = cancel.cancelled() => return Err(AcmeError::Cancelled),
                checked = bounded => checked,
            };

            match checked {
                Ok(Ok(true)) => {
                    debug!(
                        record = %fqdn,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(Ok(false)) => {
                    trace!(record = %fqdn, "Record not yet propagated");
                }
                Ok(Err(e)) => {
                    warn!(record = %fqdn, error = %e, "DNS lookup error");
                }
                Err(_) => {
                    trace!(record = %fqdn, "DNS check still running at deadline");
                }
            }

            if Instant::now() + self.config.polling_interval > deadline {
                return Err(AcmeError::Challenge {
                    domain: domain.to_string(),
                    source: ProviderError::Propagation {
                        record: fqdn.to_string(),
                        message: format!(
                            "record not visible after {}s",
                            self.config.timeout.as_secs()
                        ),
                    },
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(AcmeError::Cancelled),
                _ = tokio::time::sleep(self.config.polling_interval) => {}
            }
        }
    }

    async fn check(&self, fqdn: &str, expected_value: &str) -> Result<bool, ProviderError> {
        if !has_value(&self.resolver, fqdn, expected_value).await? {
            return Ok(false);
        }
        if !self.config.require_authoritative {
            return Ok(true);
        }

        let authoritative = self.authoritative_nameservers(fqdn).await?;
        if authoritative.is_empty() {
            return Err(ProviderError::Propagation {
                record: fqdn.to_string(),
                message: "no authoritative nameservers found".to_string(),
            });
        }

        for addr in authoritative {
            let resolver = resolver_for(&[addr]);
            if !has_value(&resolver, fqdn, expected_value).await? {
                trace!(
                    record = %fqdn,
                    nameserver = %addr,
                    "Authoritative nameserver lacks record"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Addresses of the nameservers of the closest enclosing zone
    async fn authoritative_nameservers(
        &self,
        fqdn: &str,
    ) -> Result<Vec<SocketAddr>, ProviderError> {
        let mut name = fqdn.trim_end_matches('.');
        loop {
            match self.resolver.ns_lookup(format!("{}.", name)).await {
                Ok(lookup) => {
                    let mut addrs = Vec::new();
                    for ns in lookup.iter() {
                        let host = ns.to_string();
                        match self.resolver.lookup_ip(host.as_str()).await {
                            Ok(ips) => addrs.extend(ips.iter().map(|ip| SocketAddr::new(ip, 53))),
                            Err(e) => {
                                warn!(
                                    nameserver = %host,
                                    error = %e,
                                    "Failed to resolve nameserver"
                                )
                            }
                        }
                    }
                    if !addrs.is_empty() {
                        debug!(
                            zone = %name,
                            count = addrs.len(),
                            "Found authoritative nameservers"
                        );
                        return Ok(addrs);
                    }
                }
                Err(e) if is_no_records(&e) => {}
                Err(e) => return Err(lookup_error(name, e)),
            }

            match name.find('.') {
                Some(pos) => name = &name[pos + 1..],
                None => return Ok(Vec::new()),
            }
        }
    }
}

async fn has_value(
    resolver: &TokioAsyncResolver,
    fqdn: &str,
    expected_value: &str,
) -> Result<bool, ProviderError> {
    match resolver.txt_lookup(format!("{}.", fqdn.trim_end_matches('.'))).await {
        Ok(records) => Ok(records.iter().any(|record| {
            // TXT records can hold several strings
            let value: String = record
                .txt_data()
                .iter()
                .map(|data| String::from_utf8_lossy(data))
                .collect();
            value == expected_value
        })),
        Err(e) if is_no_records(&e) => Ok(false),
        Err(e) => Err(lookup_error(fqdn, e)),
    }
}

fn is_no_records(e: &ResolveError) -> bool {
    matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

fn lookup_error(name: &str, e: ResolveError) -> ProviderError {
    ProviderError::Lookup {
        name: name.to_string(),
        message: e.to_string(),
    }
}

/// Resolver querying exactly the given servers, without caching
fn resolver_for(addrs: &[SocketAddr]) -> TokioAsyncResolver {
    let mut config = ResolverConfig::new();
    for addr in addrs {
        config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
        config.add_name_server(NameServerConfig::new(*addr, Protocol::Tcp));
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(5);
    opts.attempts = 2;
    opts.cache_size = 0;

    TokioAsyncResolver::tokio(config, opts)
}

async fn nameserver_addrs(nameserver: &str) -> Result<Vec<SocketAddr>, ProviderError> {
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return Ok(vec![addr]);
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(nameserver)
        .await
        .map_err(|e| ProviderError::Lookup {
            name: nameserver.to_string(),
            message: e.to_string(),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ProviderError::Lookup {
            name: nameserver.to_string(),
            message: "nameserver has no addresses".to_string(),
        });
    }
    Ok(addrs)
}
