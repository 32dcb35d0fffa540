//! One-shot conversion of the legacy v1 storage layout

use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::registry::CertificateRegistry;
use crate::types::{base64_bytes, Certificate, Domain, StoredData};

#[derive(Debug, Deserialize)]
struct LegacyAccount {
    #[serde(rename = "Email", default)]
    email: String,
    #[serde(rename = "DomainsCertificate", default)]
    domains_certificate: LegacyDomainsCertificate,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyDomainsCertificate {
    #[serde(rename = "Certs", default)]
    certs: Vec<LegacyEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(rename = "Domains")]
    domains: Domain,
    #[serde(rename = "Certificate")]
    certificate: Option<LegacyPayload>,
}

#[derive(Debug, Deserialize)]
struct LegacyPayload {
    #[serde(rename = "PrivateKey", with = "base64_bytes")]
    private_key: Vec<u8>,
    #[serde(rename = "Certificate", with = "base64_bytes")]
    certificate: Vec<u8>,
}

/// Converts a legacy JSON document into the current layout.
///
/// Entries without certificate material are dropped, duplicate domain
/// sets keep the entry expiring last, and the old account is discarded
/// so a fresh one is registered on first use.
pub fn convert(json: &str) -> Result<StoredData, StoreError> {
    let legacy: LegacyAccount = serde_json::from_str(json)?;

    let mut certificates = Vec::new();
    for entry in legacy.domains_certificate.certs {
        match entry.certificate {
            Some(payload) => certificates.push(Certificate::new(
                entry.domains,
                payload.certificate,
                payload.private_key,
            )),
            None => warn!(
                "Legacy entry for {} has no certificate material, dropping it",
                entry.domains.main
            ),
        }
    }

    let mut registry = CertificateRegistry::new(certificates);
    registry.dedup_by_domain();

    if !legacy.email.is_empty() {
        info!(
            "Legacy account for {} is not carried over, a new account will be registered on first use",
            legacy.email
        );
    }

    Ok(StoredData {
        account: None,
        certificates: registry.into_certificates(),
        http_challenges: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rcgen::{CertificateParams, KeyPair};

    fn pem_cert_expiring_in(days: i64) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        cert.pem().into_bytes()
    }

    fn legacy_entry(main: &str, pem: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "Domains": {"Main": main},
            "Certificate": {
                "Domain": {"Main": main},
                "CertURL": "https://example.com/cert",
                "PrivateKey": STANDARD.encode(b"key material"),
                "Certificate": STANDARD.encode(pem),
            }
        })
    }

    #[test]
    fn convert_extracts_certificates_and_drops_the_account() {
        let pem = pem_cert_expiring_in(60);
        let document = serde_json::json!({
            "Email": "ops@example.com",
            "Registration": {"uri": "https://example.com/reg"},
            "PrivateKey": STANDARD.encode(b"account key"),
            "DomainsCertificate": {"Certs": [legacy_entry("example.com", &pem)]},
        });

        let data = convert(&document.to_string()).unwrap();
        assert!(data.account.is_none());
        assert_eq!(data.certificates.len(), 1);
        assert_eq!(data.certificates[0].domain.main, "example.com");
        assert_eq!(data.certificates[0].certificate, pem);
        assert_eq!(data.certificates[0].key, b"key material");
    }

    #[test]
    fn convert_skips_entries_without_material() {
        let document = serde_json::json!({
            "Email": "ops@example.com",
            "DomainsCertificate": {"Certs": [
                {"Domains": {"Main": "pending.example.com"}, "Certificate": null},
            ]},
        });

        let data = convert(&document.to_string()).unwrap();
        assert!(data.certificates.is_empty());
    }

    #[test]
    fn convert_keeps_the_longest_lived_duplicate() {
        let older = pem_cert_expiring_in(10);
        let newer = pem_cert_expiring_in(60);
        let document = serde_json::json!({
            "DomainsCertificate": {"Certs": [
                legacy_entry("example.com", &older),
                legacy_entry("example.com", &newer),
            ]},
        });

        let data = convert(&document.to_string()).unwrap();
        assert_eq!(data.certificates.len(), 1);
        assert_eq!(data.certificates[0].certificate, newer);
    }

    #[test]
    fn convert_rejects_invalid_json() {
        assert!(convert("not json").is_err());
    }
}
