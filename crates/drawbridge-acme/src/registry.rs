//! In-memory view over the stored certificates

use std::sync::Arc;

use drawbridge_core::UtcDateTime;

use crate::types::{Certificate, Domain};
use crate::validation::domain_matches;

/// Finds the first certificate whose domain set covers the given name.
///
/// The name is expected in canonical form. The scan is linear, certificate
/// counts stay small enough that an index would not pay for itself.
pub fn find_covering<'a>(certificates: &'a [Certificate], name: &str) -> Option<&'a Certificate> {
    certificates.iter().find(|certificate| {
        certificate
            .domain
            .to_vec()
            .iter()
            .any(|cert_name| domain_matches(cert_name, name))
    })
}

/// Whether every requested name is covered by some stored certificate.
pub fn covers_all(certificates: &[Certificate], names: &[String]) -> bool {
    names
        .iter()
        .all(|name| find_covering(certificates, name).is_some())
}

/// Owned collection of certificates with upsert and renewal queries.
#[derive(Debug, Clone, Default)]
pub struct CertificateRegistry {
    certificates: Vec<Certificate>,
}

impl CertificateRegistry {
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self { certificates }
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Certificate> {
        find_covering(&self.certificates, name)
    }

    pub fn covers(&self, names: &[String]) -> bool {
        covers_all(&self.certificates, names)
    }

    /// Replaces the certificate with the same domain set, or appends.
    pub fn upsert(&mut self, certificate: Certificate) {
        match self
            .certificates
            .iter_mut()
            .find(|existing| existing.domain == certificate.domain)
        {
            Some(existing) => *existing = certificate,
            None => self.certificates.push(certificate),
        }
    }

    pub fn due_for_renewal(&self, now: UtcDateTime) -> Vec<&Certificate> {
        self.certificates
            .iter()
            .filter(|certificate| certificate.needs_renewal(now))
            .collect()
    }

    /// Collapses duplicate domain sets, keeping the entry expiring last.
    ///
    /// Duplicates only arise from legacy stores written by older versions
    /// that appended instead of replacing.
    pub fn dedup_by_domain(&mut self) {
        self.certificates.sort_by(|a, b| {
            a.domain
                .main
                .cmp(&b.domain.main)
                .then_with(|| a.domain.sans.join(",").cmp(&b.domain.sans.join(",")))
                .then_with(|| b.not_after().cmp(&a.not_after()))
        });
        self.certificates
            .dedup_by(|candidate, kept| candidate.domain == kept.domain);
    }

    pub fn snapshot(&self) -> Arc<Vec<Certificate>> {
        Arc::new(self.certificates.clone())
    }

    pub fn into_certificates(self) -> Vec<Certificate> {
        self.certificates
    }
}

impl From<Vec<Certificate>> for CertificateRegistry {
    fn from(certificates: Vec<Certificate>) -> Self {
        Self::new(certificates)
    }
}
