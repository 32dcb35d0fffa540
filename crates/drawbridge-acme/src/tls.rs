//! rustls integration: snapshot-backed SNI certificate resolution

use std::collections::HashMap;
use std::fmt;
use std::io::BufReader;
use std::sync::{Arc, Mutex, PoisonError};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::challenge::{TlsAlpn01Challenge, ACME_TLS_ALPN_PROTOCOL};
use crate::errors::TlsError;
use crate::registry::find_covering;
use crate::service::CertificateSnapshot;
use crate::validation::canonical_domain;

/// Builds a rustls signing key from a PEM chain and a PEM private key.
pub fn certified_key_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertifiedKey, TlsError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
    if certs.is_empty() {
        return Err(TlsError::InvalidCertificate(
            "No certificates in PEM bundle".to_string(),
        ));
    }
    let key = private_key_from_pem(key_pem)?;

    let provider = CryptoProvider::get_default().ok_or(TlsError::NoCryptoProvider)?;
    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|e| TlsError::InvalidKey(e.to_string()))?;
    Ok(CertifiedKey::new(certs, signing_key))
}

fn private_key_from_pem(key_pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(key_pem);
    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| TlsError::InvalidKey(e.to_string()))?
        {
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            Some(_) => continue,
            None => return Err(TlsError::InvalidKey("No private key in PEM".to_string())),
        }
    }
}

/// Self-signed certificate served when nothing covers the requested
/// name and nothing can be obtained.
pub fn self_signed_fallback(hostname: &str) -> Result<CertifiedKey, TlsError> {
    let mut params = rcgen::CertificateParams::new(vec![hostname.to_string()])
        .map_err(|e| TlsError::Generation(e.to_string()))?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    let key_pair = rcgen::KeyPair::generate().map_err(|e| TlsError::Generation(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| TlsError::Generation(e.to_string()))?;

    let provider = CryptoProvider::get_default().ok_or(TlsError::NoCryptoProvider)?;
    let signing_key = provider
        .key_provider
        .load_private_key(PrivatePkcs8KeyDer::from(key_pair.serialize_der()).into())
        .map_err(|e| TlsError::InvalidKey(e.to_string()))?;
    Ok(CertifiedKey::new(vec![cert.der().clone()], signing_key))
}

/// SNI certificate resolver over the published snapshot.
///
/// Parsed certificates are cached per name and the cache is dropped
/// whenever a new snapshot arrives.
pub struct CertificateResolver {
    snapshots: Mutex<watch::Receiver<CertificateSnapshot>>,
    cache: Mutex<HashMap<String, Arc<CertifiedKey>>>,
    tls_alpn: Option<Arc<TlsAlpn01Challenge>>,
    fallback: Arc<CertifiedKey>,
}

impl CertificateResolver {
    pub fn new(
        snapshots: watch::Receiver<CertificateSnapshot>,
        tls_alpn: Option<Arc<TlsAlpn01Challenge>>,
        fallback: CertifiedKey,
    ) -> Self {
        Self {
            snapshots: Mutex::new(snapshots),
            cache: Mutex::new(HashMap::new()),
            tls_alpn,
            fallback: Arc::new(fallback),
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<CertifiedKey>> {
        let snapshot = {
            let mut snapshots = self
                .snapshots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if snapshots.has_changed().unwrap_or(false) {
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
            }
            let snapshot = snapshots.borrow_and_update().clone();
            snapshot
        };

        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Arc::clone(cached));
        }

        let certificate = find_covering(&snapshot, name)?;
        match certified_key_from_pem(&certificate.certificate, &certificate.key) {
            Ok(key) => {
                let key = Arc::new(key);
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), Arc::clone(&key));
                Some(key)
            }
            Err(err) => {
                warn!("Stored certificate for {} is unusable: {}", name, err);
                None
            }
        }
    }
}

impl ResolvesServerCert for CertificateResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = match client_hello.server_name() {
            Some(name) => canonical_domain(name),
            None => {
                debug!("Client offered no SNI, serving the fallback certificate");
                return Some(Arc::clone(&self.fallback));
            }
        };

        let is_acme_handshake = client_hello
            .alpn()
            .map(|mut protocols| protocols.any(|protocol| protocol == ACME_TLS_ALPN_PROTOCOL))
            .unwrap_or(false);
        if is_acme_handshake {
            // Validation handshakes get the challenge certificate or
            // nothing, never a regular one.
            return self
                .tls_alpn
                .as_ref()
                .and_then(|challenge| challenge.resolve(&server_name));
        }

        match self.lookup(&server_name) {
            Some(key) => Some(key),
            None => Some(Arc::clone(&self.fallback)),
        }
    }
}

impl fmt::Debug for CertificateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateResolver").finish_non_exhaustive()
    }
}

/// Server configuration wired to the resolver, accepting HTTP and ACME
/// validation handshakes.
pub fn server_config(resolver: Arc<CertificateResolver>) -> Result<ServerConfig, TlsError> {
    let provider = CryptoProvider::get_default().ok_or(TlsError::NoCryptoProvider)?;
    let mut config = ServerConfig::builder_with_provider(Arc::clone(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Generation(e.to_string()))?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![
        b"h2".to_vec(),
        b"http/1.1".to_vec(),
        ACME_TLS_ALPN_PROTOCOL.to_vec(),
    ];
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Certificate, Domain};

    fn install_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    fn pem_pair(domain: &str) -> (Vec<u8>, Vec<u8>) {
        let params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (
            cert.pem().into_bytes(),
            key_pair.serialize_pem().into_bytes(),
        )
    }

    #[test]
    fn parses_generated_pem_material() {
        install_provider();
        let (cert_pem, key_pem) = pem_pair("example.com");
        let key = certified_key_from_pem(&cert_pem, &key_pem).unwrap();
        assert_eq!(key.cert.len(), 1);
    }

    #[test]
    fn rejects_garbage_material() {
        install_provider();
        let (cert_pem, _) = pem_pair("example.com");
        assert!(matches!(
            certified_key_from_pem(&cert_pem, b"not a key"),
            Err(TlsError::InvalidKey(_))
        ));
        assert!(matches!(
            certified_key_from_pem(b"not a cert", b"not a key"),
            Err(TlsError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn lookup_follows_snapshot_updates() {
        install_provider();
        let (cert_pem, key_pem) = pem_pair("example.com");
        let snapshot: CertificateSnapshot = Arc::new(vec![Certificate::new(
            Domain::new("example.com"),
            cert_pem,
            key_pem,
        )]);
        let (sender, receiver) = watch::channel(snapshot);
        let resolver =
            CertificateResolver::new(receiver, None, self_signed_fallback("localhost").unwrap());

        let first = resolver.lookup("example.com").unwrap();
        let second = resolver.lookup("example.com").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(resolver.lookup("other.org").is_none());

        sender.send(Arc::new(Vec::new())).unwrap();
        assert!(resolver.lookup("example.com").is_none());
    }
}
