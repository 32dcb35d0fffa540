//! Certificate service: on-demand resolution, provisioning and renewal

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account::ensure_account;
use crate::challenge::{Dns01Challenge, Http01Challenge, TlsAlpn01Challenge};
use crate::config::AcmeConfig;
use crate::dns::provider_from_config;
use crate::errors::{AcmeError, BuilderError, StoreError};
use crate::issuer::{CertificateIssuer, ChallengeHandlers, Issuer};
use crate::registry::{find_covering, CertificateRegistry};
use crate::store::Store;
use crate::types::{Certificate, Domain};
use crate::validation::{
    canonical_domain, dedup_domains, domain_matches, is_wildcard, validate_domain,
};

/// Published view of the certificates, shared with TLS resolvers.
pub type CertificateSnapshot = Arc<Vec<Certificate>>;

const PERSIST_ATTEMPTS: usize = 3;
const RESOLVE_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Main domains with an order in flight. At most one obtain runs per
/// main domain at any time, everyone else waits for the published
/// result.
#[derive(Default)]
struct ResolvingSet {
    inner: RwLock<HashSet<String>>,
}

impl ResolvingSet {
    fn try_claim(self: &Arc<Self>, domain: &str) -> Option<ResolvingGuard> {
        let mut set = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if set.insert(domain.to_string()) {
            Some(ResolvingGuard {
                set: Arc::clone(self),
                domain: domain.to_string(),
            })
        } else {
            None
        }
    }
}

struct ResolvingGuard {
    set: Arc<ResolvingSet>,
    domain: String,
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        self.set
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.domain);
    }
}

enum RegistryCommand {
    Upsert {
        certificate: Certificate,
        done: oneshot::Sender<()>,
    },
}

/// The writer task owns the registry. Updates flow in over the channel,
/// are persisted, then published through the watch before the sender is
/// acknowledged. The ack ordering is what lets callers drop their
/// resolving claim only after the new snapshot is visible.
fn spawn_registry_writer(
    store: Arc<dyn Store>,
    mut registry: CertificateRegistry,
    publisher: watch::Sender<CertificateSnapshot>,
    mut commands: mpsc::Receiver<RegistryCommand>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                command = commands.recv() => command,
                _ = shutdown.cancelled() => None,
            };
            let Some(command) = command else {
                debug!("Certificate registry writer stopped");
                return;
            };
            match command {
                RegistryCommand::Upsert { certificate, done } => {
                    registry.upsert(certificate.clone());
                    if let Err(err) = persist_certificate(store.as_ref(), &certificate).await {
                        error!(
                            "Failed to persist certificate for {}: {}",
                            certificate.domain.main, err
                        );
                    }
                    let _ = publisher.send(registry.snapshot());
                    let _ = done.send(());
                }
            }
        }
    });
}

/// Load-modify-commit against the store, retried on version conflicts
/// from other instances sharing it.
async fn persist_certificate(
    store: &dyn Store,
    certificate: &Certificate,
) -> Result<(), StoreError> {
    let mut attempt = 0;
    loop {
        let mut txn = store.begin().await?;
        let mut scratch = CertificateRegistry::new(std::mem::take(&mut txn.data().certificates));
        scratch.upsert(certificate.clone());
        txn.data().certificates = scratch.into_certificates();
        match txn.commit().await {
            Ok(()) => return Ok(()),
            Err(StoreError::Conflict(key)) if attempt + 1 < PERSIST_ATTEMPTS => {
                attempt += 1;
                debug!("Retrying certificate persist after a conflict on {}", key);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Assembles an [`AcmeService`] from configuration and a store.
#[derive(Default)]
pub struct AcmeServiceBuilder {
    config: Option<AcmeConfig>,
    store: Option<Arc<dyn Store>>,
    issuer: Option<Arc<dyn Issuer>>,
    static_domains: Vec<String>,
    shutdown: Option<CancellationToken>,
}

impl AcmeServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AcmeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the CA-backed issuer, mainly for tests.
    pub fn with_issuer(mut self, issuer: Arc<dyn Issuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Names served by operator-provided certificates, wildcards
    /// included. They count as covered and are never ordered from the CA.
    pub fn with_static_domains(mut self, domains: Vec<String>) -> Self {
        self.static_domains = domains;
        self
    }

    /// Token that stops the writer task and the renewal loop.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub async fn build(self) -> Result<AcmeService, AcmeError> {
        let config = self.config.ok_or(BuilderError::MissingConfig)?;
        let store = self.store.ok_or(BuilderError::MissingStore)?;
        config.validate()?;

        let mut handlers = ChallengeHandlers::default();
        if config.http_challenge.is_some() {
            handlers.http = Some(Arc::new(Http01Challenge::new(Arc::clone(&store))));
        }
        if config.tls_challenge.is_some() {
            handlers.tls_alpn = Some(Arc::new(TlsAlpn01Challenge::new()));
        }
        if let Some(dns_config) = &config.dns_challenge {
            let provider = provider_from_config(dns_config)?;
            let mut dns = Dns01Challenge::new(provider)
                .with_delay_before_check(Duration::from_secs(dns_config.delay_before_check))
                .with_resolvers(dns_config.resolvers.clone());
            if dns_config.disable_propagation_check {
                dns = dns.without_propagation_check();
            }
            handlers.dns = Some(Arc::new(dns));
        }

        let mut registry = CertificateRegistry::new(store.load().await?.certificates);
        registry.dedup_by_domain();
        info!("Loaded {} stored certificate(s)", registry.len());

        let shutdown = self.shutdown.unwrap_or_default();
        let (publisher, snapshots) = watch::channel(registry.snapshot());
        let (commands, receiver) = mpsc::channel(16);
        spawn_registry_writer(
            Arc::clone(&store),
            registry,
            publisher,
            receiver,
            shutdown.clone(),
        );

        Ok(AcmeService {
            config,
            store,
            resolving: Arc::new(ResolvingSet::default()),
            commands,
            snapshots,
            issuer: Mutex::new(self.issuer),
            handlers,
            static_domains: self
                .static_domains
                .iter()
                .map(|name| canonical_domain(name))
                .collect(),
            shutdown,
        })
    }
}

/// Automated certificate management for the proxy's TLS listeners.
///
/// The service resolves certificates for incoming SNI names, provisions
/// the configured domain sets, and renews whatever approaches expiry.
/// All updates funnel through one writer task, so the store and the
/// published snapshot never diverge.
pub struct AcmeService {
    config: AcmeConfig,
    store: Arc<dyn Store>,
    resolving: Arc<ResolvingSet>,
    commands: mpsc::Sender<RegistryCommand>,
    snapshots: watch::Receiver<CertificateSnapshot>,
    issuer: Mutex<Option<Arc<dyn Issuer>>>,
    handlers: ChallengeHandlers,
    static_domains: Vec<String>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AcmeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeService").finish_non_exhaustive()
    }
}

impl AcmeService {
    pub fn builder() -> AcmeServiceBuilder {
        AcmeServiceBuilder::new()
    }

    pub fn config(&self) -> &AcmeConfig {
        &self.config
    }

    /// HTTP-01 responder, present when the HTTP challenge is enabled.
    pub fn http_challenge(&self) -> Option<Arc<Http01Challenge>> {
        self.handlers.http.clone()
    }

    /// TLS-ALPN-01 responder, present when the TLS challenge is enabled.
    pub fn tls_alpn_challenge(&self) -> Option<Arc<TlsAlpn01Challenge>> {
        self.handlers.tls_alpn.clone()
    }

    /// Receiver observing every published certificate snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CertificateSnapshot> {
        self.snapshots.clone()
    }

    /// Currently published certificates.
    pub fn snapshot(&self) -> CertificateSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Returns a certificate covering `server_name`, ordering one on
    /// demand when allowed. `None` tells the caller to fall back.
    pub async fn resolve_certificate(&self, server_name: &str) -> Option<Certificate> {
        let name = canonical_domain(server_name);
        if name.is_empty() {
            return None;
        }

        if let Some(found) = find_covering(&self.snapshot(), &name) {
            return Some(found.clone());
        }
        if self.statically_covered(&name) {
            return None;
        }
        if !self.config.on_demand {
            return None;
        }

        match self.resolving.try_claim(&name) {
            Some(_guard) => {
                // Recheck under the claim, a racing obtain may have
                // published while it was acquired.
                if let Some(found) = find_covering(&self.snapshot(), &name) {
                    return Some(found.clone());
                }
                match self.obtain_and_publish(&Domain::new(name.clone())).await {
                    Ok(certificate) => Some(certificate),
                    Err(err) => {
                        warn!("On-demand certificate for {} failed: {}", name, err);
                        None
                    }
                }
            }
            None => self.wait_for_published(&name).await,
        }
    }

    /// Obtains a certificate for a configured domain set unless existing
    /// ones already cover it. Returns the certificate covering the main
    /// domain, or `None` when it is covered elsewhere or the order runs
    /// on another task.
    pub async fn provision(&self, domain: &Domain) -> Result<Option<Certificate>, AcmeError> {
        let names = validate_domain(domain)?;
        self.check_wildcard_support(&names)?;

        let snapshot = self.snapshot();
        if self.all_covered(&snapshot, &names) {
            debug!("Existing certificates already cover {}", names.join(", "));
            return Ok(find_covering(&snapshot, &names[0]).cloned());
        }

        let Some(_guard) = self.resolving.try_claim(&names[0]) else {
            debug!("An order for {} is already in flight", names[0]);
            return Ok(None);
        };
        let snapshot = self.snapshot();
        if self.all_covered(&snapshot, &names) {
            return Ok(find_covering(&snapshot, &names[0]).cloned());
        }

        self.obtain_and_publish(domain).await.map(Some)
    }

    /// Provisions every configured domain set, continuing past failures.
    pub async fn provision_configured(&self) {
        for domain in dedup_domains(&self.config.domains) {
            if let Err(err) = self.provision(&domain).await {
                error!(
                    "Failed to provision certificate for {}: {}",
                    domain.main, err
                );
            }
        }
    }

    /// Runs renewal sweeps until the shutdown token fires, one
    /// immediately and then one per configured interval.
    pub async fn start_renewal_loop(self: Arc<Self>) -> Result<(), AcmeError> {
        let interval = Duration::from_secs(self.config.renewal_interval);
        info!(
            "Certificate renewal loop started, sweeping every {:?}",
            interval
        );

        loop {
            self.renew_due_certificates().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.cancelled() => {
                    info!("Certificate renewal loop stopped");
                    return Ok(());
                }
            }
        }
    }

    /// One sweep over the published certificates, renewing every one
    /// inside the renewal window.
    pub async fn renew_due_certificates(&self) {
        let now = Utc::now();
        let snapshot = self.snapshot();
        for certificate in snapshot.iter() {
            if !certificate.needs_renewal(now) {
                continue;
            }
            let domain = certificate.domain.clone();
            info!("Renewing certificate for {}", domain.main);

            let names = match validate_domain(&domain) {
                Ok(names) => names,
                Err(err) => {
                    warn!(
                        "Stored certificate for {} is not renewable: {}",
                        domain.main, err
                    );
                    continue;
                }
            };
            if self.check_wildcard_support(&names).is_err() {
                warn!(
                    "Certificate for {} needs the DNS challenge to renew",
                    domain.main
                );
                continue;
            }

            let Some(_guard) = self.resolving.try_claim(&names[0]) else {
                debug!("Skipping renewal of {}, an order is in flight", names[0]);
                continue;
            };
            if let Err(err) = self.obtain_and_publish(&domain).await {
                warn!("Failed to renew certificate for {}: {}", domain.main, err);
            }
        }
    }

    fn check_wildcard_support(&self, names: &[String]) -> Result<(), AcmeError> {
        if self.handlers.dns.is_none() {
            if let Some(wildcard) = names.iter().find(|name| is_wildcard(name)) {
                return Err(AcmeError::WildcardRequiresDns(wildcard.clone()));
            }
        }
        Ok(())
    }

    /// Whether an operator-provided certificate already serves the name.
    fn statically_covered(&self, name: &str) -> bool {
        self.static_domains
            .iter()
            .any(|pattern| domain_matches(pattern, name))
    }

    fn all_covered(&self, certificates: &[Certificate], names: &[String]) -> bool {
        names.iter().all(|name| {
            self.statically_covered(name) || find_covering(certificates, name).is_some()
        })
    }

    async fn obtain_and_publish(&self, domain: &Domain) -> Result<Certificate, AcmeError> {
        let names = validate_domain(domain)?;
        let issuer = self.ensure_issuer().await?;
        let issued = issuer.obtain(&names).await?;
        let certificate = Certificate::new(
            Domain::new(names[0].clone()).with_sans(names[1..].to_vec()),
            issued.certificate,
            issued.key,
        );
        self.publish(certificate.clone()).await;
        Ok(certificate)
    }

    /// Hands the certificate to the registry writer and waits until the
    /// persisted snapshot is visible to every subscriber.
    async fn publish(&self, certificate: Certificate) {
        let (done, ack) = oneshot::channel();
        if self
            .commands
            .send(RegistryCommand::Upsert { certificate, done })
            .await
            .is_err()
        {
            error!("Certificate registry writer is gone, dropping the update");
            return;
        }
        let _ = ack.await;
    }

    /// Waits for another caller's in-flight obtain to publish a
    /// certificate covering `name`.
    async fn wait_for_published(&self, name: &str) -> Option<Certificate> {
        let mut snapshots = self.snapshots.clone();
        let deadline = tokio::time::Instant::now() + RESOLVE_WAIT_TIMEOUT;
        loop {
            let current = snapshots.borrow_and_update().clone();
            if let Some(found) = find_covering(&current, name) {
                return Some(found.clone());
            }
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("Timed out waiting for the in-flight certificate for {}", name);
                    return None;
                }
            }
        }
    }

    /// The issuer is built lazily so the service comes up without
    /// touching the CA; account registration happens with the first
    /// order.
    async fn ensure_issuer(&self) -> Result<Arc<dyn Issuer>, AcmeError> {
        let mut slot = self.issuer.lock().await;
        if let Some(issuer) = slot.as_ref() {
            return Ok(Arc::clone(issuer));
        }
        let account = ensure_account(self.store.as_ref(), &self.config).await?;
        let issuer: Arc<dyn Issuer> = Arc::new(CertificateIssuer::new(
            account,
            self.config.key_type,
            self.handlers.clone(),
        ));
        *slot = Some(Arc::clone(&issuer));
        Ok(issuer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpChallengeConfig;
    use crate::issuer::IssuedCertificate;
    use crate::store::LocalStore;
    use crate::types::StoredData;
    use async_trait::async_trait;
    use rcgen::{CertificateParams, KeyPair};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MockIssuer {
        calls: AtomicU32,
        delay: Duration,
    }

    #[async_trait]
    impl Issuer for MockIssuer {
        async fn obtain(&self, names: &[String]) -> Result<IssuedCertificate, AcmeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(IssuedCertificate {
                certificate: format!("cert:{}", names.join(",")).into_bytes(),
                key: b"key".to_vec(),
            })
        }
    }

    fn pem_cert_expiring_in(days: i64) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        cert.pem().into_bytes()
    }

    fn config() -> AcmeConfig {
        AcmeConfig::new("ops@example.com", "acme.json")
            .with_http_challenge(HttpChallengeConfig::default())
    }

    async fn service_with_mock(
        dir: &tempfile::TempDir,
        issuer: Arc<MockIssuer>,
        config: AcmeConfig,
    ) -> Arc<AcmeService> {
        let store = Arc::new(LocalStore::new(dir.path().join("acme.json")));
        Arc::new(
            AcmeService::builder()
                .with_config(config)
                .with_store(store)
                .with_issuer(issuer)
                .build()
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn resolve_obtains_once_then_serves_from_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        let first = service.resolve_certificate("Example.COM").await.unwrap();
        assert_eq!(first.certificate, b"cert:example.com");

        let second = service.resolve_certificate("example.com").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_order() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        let (first, second) = tokio::join!(
            service.resolve_certificate("example.com"),
            service.resolve_certificate("example.com"),
        );
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_respects_the_on_demand_flag() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service =
            service_with_mock(&dir, issuer.clone(), config().with_on_demand(false)).await;

        assert!(service.resolve_certificate("example.com").await.is_none());
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provision_skips_already_covered_domains() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        let first = service.provision(&Domain::new("example.com")).await.unwrap();
        assert!(first.is_some());
        let second = service.provision(&Domain::new("example.com")).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provision_rejects_wildcards_without_dns() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        let err = service
            .provision(&Domain::new("*.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::WildcardRequiresDns(_)));
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolved_certificates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        service.resolve_certificate("example.com").await.unwrap();

        let stored = LocalStore::new(dir.path().join("acme.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(stored.certificates.len(), 1);
        assert_eq!(stored.certificates[0].domain.main, "example.com");
    }

    #[tokio::test]
    async fn renewal_sweep_renews_only_expiring_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("acme.json"));
        let mut data = StoredData::default();
        data.certificates.push(Certificate::new(
            Domain::new("soon.example.com"),
            pem_cert_expiring_in(10),
            b"key".to_vec(),
        ));
        data.certificates.push(Certificate::new(
            Domain::new("later.example.com"),
            pem_cert_expiring_in(90),
            b"key".to_vec(),
        ));
        store.save(&data).unwrap();

        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(&dir, issuer.clone(), config()).await;

        service.renew_due_certificates().await;
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);

        let snapshot = service.snapshot();
        let renewed = find_covering(&snapshot, "soon.example.com").unwrap();
        assert_eq!(renewed.certificate, b"cert:soon.example.com");
        let untouched = find_covering(&snapshot, "later.example.com").unwrap();
        assert_ne!(untouched.certificate, b"cert:later.example.com");
    }

    #[tokio::test]
    async fn renewal_loop_stops_on_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let cancellation = CancellationToken::new();
        let store = Arc::new(LocalStore::new(dir.path().join("acme.json")));
        let service = Arc::new(
            AcmeService::builder()
                .with_config(config())
                .with_store(store)
                .with_issuer(issuer)
                .with_shutdown(cancellation.clone())
                .build()
                .await
                .unwrap(),
        );

        let handle = tokio::spawn(Arc::clone(&service).start_renewal_loop());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancellation.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn static_domains_suppress_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let store = Arc::new(LocalStore::new(dir.path().join("acme.json")));
        let service = Arc::new(
            AcmeService::builder()
                .with_config(config())
                .with_store(store)
                .with_issuer(issuer.clone())
                .with_static_domains(vec![
                    "Static.Example.com".to_string(),
                    "*.wild.example.com".to_string(),
                ])
                .build()
                .await
                .unwrap(),
        );

        assert!(service
            .resolve_certificate("static.example.com")
            .await
            .is_none());
        let provisioned = service
            .provision(&Domain::new("a.wild.example.com"))
            .await
            .unwrap();
        assert!(provisioned.is_none());
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn configured_domains_are_provisioned_once_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(
            &dir,
            issuer.clone(),
            config().with_domains(vec![Domain::new("acme.wtf")]),
        )
        .await;

        service.provision_configured().await;
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);

        let served = service.resolve_certificate("acme.wtf").await.unwrap();
        assert_eq!(served.certificate, b"cert:acme.wtf");
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);

        let stored = LocalStore::new(dir.path().join("acme.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(stored.certificates.len(), 1);
    }

    #[tokio::test]
    async fn removing_a_configured_domain_keeps_its_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("acme.json"));
        let mut data = StoredData::default();
        data.certificates.push(Certificate::new(
            Domain::new("old.example.com"),
            pem_cert_expiring_in(90),
            b"key".to_vec(),
        ));
        store.save(&data).unwrap();

        let issuer = Arc::new(MockIssuer::default());
        let service = service_with_mock(
            &dir,
            issuer.clone(),
            config().with_domains(vec![Domain::new("new.example.com")]),
        )
        .await;

        service.provision_configured().await;

        let snapshot = service.snapshot();
        assert!(find_covering(&snapshot, "old.example.com").is_some());
        assert!(find_covering(&snapshot, "new.example.com").is_some());
    }

    #[tokio::test]
    async fn builder_requires_config_and_store() {
        let err = AcmeService::builder().build().await.unwrap_err();
        assert!(matches!(
            err,
            AcmeError::Builder(BuilderError::MissingConfig)
        ));

        let err = AcmeService::builder()
            .with_config(config())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AcmeError::Builder(BuilderError::MissingStore)));
    }
}
