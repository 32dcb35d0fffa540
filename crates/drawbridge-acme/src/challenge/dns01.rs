//! DNS-01 challenge with optional propagation checking

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use drawbridge_core::backoff::Backoff;
use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfig, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::TokioAsyncResolver;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{ChallengeHandler, DEFAULT_POLL_INTERVAL};
use crate::dns::DnsProvider;
use crate::errors::ChallengeError;

/// Answers DNS-01 challenges through a [`DnsProvider`].
pub struct Dns01Challenge {
    provider: Arc<dyn DnsProvider>,
    delay_before_check: Duration,
    propagation_check: bool,
    resolvers: Vec<String>,
}

impl Dns01Challenge {
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            provider,
            delay_before_check: Duration::ZERO,
            propagation_check: true,
            resolvers: Vec::new(),
        }
    }

    /// Extra wait after record creation, for slow secondary name servers.
    pub fn with_delay_before_check(mut self, delay: Duration) -> Self {
        self.delay_before_check = delay;
        self
    }

    pub fn without_propagation_check(mut self) -> Self {
        self.propagation_check = false;
        self
    }

    /// Name servers queried by the propagation check, as `ip` or
    /// `ip:port`. Public resolvers are used when empty.
    pub fn with_resolvers(mut self, resolvers: Vec<String>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Polls until the TXT record is visible, bounded by the provider's
    /// propagation ceiling.
    async fn wait_for_propagation(
        &self,
        domain: &str,
        fqdn: &str,
        value: &str,
    ) -> Result<(), ChallengeError> {
        let timeout = self.provider.timeout();
        let resolver = self.resolver();
        Backoff::new(timeout)
            .with_initial_interval(Duration::from_secs(2))
            .retry("DNS-01 propagation check", || {
                let resolver = resolver.clone();
                async move {
                    let lookup = resolver
                        .txt_lookup(format!("{}.", fqdn))
                        .await
                        .map_err(|e| e.to_string())?;
                    if lookup.iter().any(|txt| txt.to_string() == value) {
                        Ok(())
                    } else {
                        Err(format!("TXT record {} not visible yet", fqdn))
                    }
                }
            })
            .await
            .map_err(|_| ChallengeError::Propagation {
                domain: domain.to_string(),
                seconds: timeout.as_secs(),
            })
    }

    fn resolver(&self) -> TokioAsyncResolver {
        if self.resolvers.is_empty() {
            return public_resolver();
        }
        let mut config = ResolverConfig::new();
        for address in &self.resolvers {
            match name_server_addr(address) {
                Some(addr) => config.add_name_server(NameServerConfig::new(addr, Protocol::Udp)),
                None => warn!("Ignoring unparseable DNS resolver address {}", address),
            }
        }
        if config.name_servers().is_empty() {
            return public_resolver();
        }
        TokioAsyncResolver::tokio(config, resolver_opts())
    }
}

#[async_trait]
impl ChallengeHandler for Dns01Challenge {
    /// The provider's propagation ceiling; it also bounds order retries
    /// for wildcard-with-root requests.
    fn timeout(&self) -> (Duration, Duration) {
        (self.provider.timeout(), DEFAULT_POLL_INTERVAL)
    }

    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ChallengeError> {
        let fqdn = txt_record_name(domain);
        let value = txt_record_value(key_auth);
        self.provider.create_txt_record(&fqdn, &value).await?;
        info!(
            "Created DNS-01 TXT record {} via {}",
            fqdn,
            self.provider.name()
        );

        if !self.delay_before_check.is_zero() {
            debug!(
                "Waiting {:?} before checking record propagation",
                self.delay_before_check
            );
            tokio::time::sleep(self.delay_before_check).await;
        }
        if self.propagation_check {
            self.wait_for_propagation(domain, &fqdn, &value).await?;
        }
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ChallengeError> {
        let fqdn = txt_record_name(domain);
        let value = txt_record_value(key_auth);
        self.provider.delete_txt_record(&fqdn, &value).await?;
        debug!("Removed DNS-01 TXT record {}", fqdn);
        Ok(())
    }
}

/// Caching is disabled so every poll reaches the authoritative servers
/// through a fresh query.
fn resolver_opts() -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.cache_size = 0;
    opts.use_hosts_file = false;
    opts.edns0 = true;
    opts.ip_strategy = LookupIpStrategy::Ipv4Only;
    opts.try_tcp_on_error = true;
    opts
}

fn public_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), resolver_opts())
}

/// Accepts `ip` or `ip:port`, defaulting to port 53.
fn name_server_addr(address: &str) -> Option<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some(addr);
    }
    address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, 53))
}

/// Record name for a domain's challenge, with any wildcard label removed.
pub fn txt_record_name(domain: &str) -> String {
    let base = domain.strip_prefix("*.").unwrap_or(domain);
    format!("_acme-challenge.{}", base)
}

/// Value the CA expects: URL-safe base64 of the SHA-256 of the key
/// authorization.
pub fn txt_record_value(key_auth: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_auth.as_bytes()))
}
