//! Core data types shared across the crate

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use drawbridge_core::UtcDateTime;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use url::Url;

/// How many days before expiry a certificate becomes due for renewal.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

/// A certificate request: one main domain plus optional SANs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(rename = "Main")]
    pub main: String,
    #[serde(rename = "SANs", default, skip_serializing_if = "Vec::is_empty")]
    pub sans: Vec<String>,
}

impl Domain {
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            sans: Vec::new(),
        }
    }

    pub fn with_sans(mut self, sans: Vec<String>) -> Self {
        self.sans = sans;
        self
    }

    /// Main domain followed by the SANs, in declaration order.
    pub fn to_vec(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(1 + self.sans.len());
        names.push(self.main.clone());
        names.extend(self.sans.iter().cloned());
        names
    }
}

/// Key algorithm used for certificate private keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "EC256")]
    Ec256,
    #[serde(rename = "EC384")]
    Ec384,
    #[serde(rename = "RSA2048")]
    Rsa2048,
    #[serde(rename = "RSA4096")]
    Rsa4096,
    #[serde(rename = "RSA8192")]
    Rsa8192,
}

impl Default for KeyType {
    fn default() -> Self {
        KeyType::Rsa4096
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyType::Ec256 => "EC256",
            KeyType::Ec384 => "EC384",
            KeyType::Rsa2048 => "RSA2048",
            KeyType::Rsa4096 => "RSA4096",
            KeyType::Rsa8192 => "RSA8192",
        };
        write!(f, "{}", name)
    }
}

/// An issued certificate with its private key, both PEM encoded.
///
/// The expiry timestamp is parsed out of the certificate lazily and cached
/// for the lifetime of the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(rename = "Domain")]
    pub domain: Domain,
    #[serde(rename = "Certificate", with = "base64_bytes")]
    pub certificate: Vec<u8>,
    #[serde(rename = "Key", with = "base64_bytes")]
    pub key: Vec<u8>,
    #[serde(skip)]
    not_after: OnceCell<Option<UtcDateTime>>,
}

impl Certificate {
    pub fn new(domain: Domain, certificate: Vec<u8>, key: Vec<u8>) -> Self {
        Self {
            domain,
            certificate,
            key,
            not_after: OnceCell::new(),
        }
    }

    /// Expiry of the leaf certificate, or `None` when the PEM is unparseable.
    pub fn not_after(&self) -> Option<UtcDateTime> {
        *self
            .not_after
            .get_or_init(|| parse_not_after(&self.certificate))
    }

    /// True when the certificate expires within the renewal window, or when
    /// its expiry cannot be determined.
    pub fn needs_renewal(&self, now: UtcDateTime) -> bool {
        match self.not_after() {
            Some(not_after) => not_after - now <= Duration::days(RENEWAL_WINDOW_DAYS),
            None => true,
        }
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain
            && self.certificate == other.certificate
            && self.key == other.key
    }
}

impl Eq for Certificate {}

fn parse_not_after(pem: &[u8]) -> Option<UtcDateTime> {
    let (_, doc) = x509_parser::pem::parse_x509_pem(pem).ok()?;
    let cert = doc.parse_x509().ok()?;
    let timestamp = cert.validity().not_after.timestamp();
    Utc.timestamp_opt(timestamp, 0).single()
}

/// A registered ACME account.
///
/// The credentials blob is whatever the ACME client hands back at
/// registration time and is passed back verbatim to restore the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "KeyType", default)]
    pub key_type: KeyType,
    #[serde(rename = "CAServer")]
    pub ca_server: String,
    #[serde(rename = "Credentials")]
    pub credentials: serde_json::Value,
}

impl Account {
    /// Whether this account can be reused for the given email and CA.
    ///
    /// CA endpoints are compared by host so that a path or scheme change on
    /// the same CA does not force a re-registration.
    pub fn matches(&self, email: &str, ca_server: &str) -> bool {
        self.email == email && ca_host(&self.ca_server) == ca_host(ca_server)
    }
}

/// Host portion of a CA endpoint, falling back to the raw string when it
/// does not parse as a URL.
pub(crate) fn ca_host(endpoint: &str) -> String {
    Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| endpoint.to_string())
}

/// A short-lived certificate used to answer a TLS-ALPN-01 challenge.
#[derive(Debug, Clone)]
pub struct ChallengeCert {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

/// Everything persisted by the certificate store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredData {
    #[serde(rename = "Account")]
    pub account: Option<Account>,
    #[serde(rename = "Certificates", default)]
    pub certificates: Vec<Certificate>,
    #[serde(rename = "HTTPChallenges", default)]
    pub http_challenges: HashMap<String, HashMap<String, String>>,
}

impl StoredData {
    pub fn set_http_challenge(
        &mut self,
        token: impl Into<String>,
        domain: impl Into<String>,
        key_auth: impl Into<String>,
    ) {
        self.http_challenges
            .entry(token.into())
            .or_default()
            .insert(domain.into(), key_auth.into());
    }

    pub fn get_http_challenge(&self, token: &str, domain: &str) -> Option<&str> {
        self.http_challenges
            .get(token)
            .and_then(|domains| domains.get(domain))
            .map(String::as_str)
    }

    /// Removes a key authorization and prunes the token bucket once empty.
    pub fn remove_http_challenge(&mut self, token: &str, domain: &str) {
        if let Some(domains) = self.http_challenges.get_mut(token) {
            domains.remove(domain);
            if domains.is_empty() {
                self.http_challenges.remove(token);
            }
        }
    }
}

/// PEM payloads are stored as base64 strings rather than JSON byte arrays.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    fn pem_cert_expiring_in(days: i64) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        cert.pem().into_bytes()
    }

    #[test]
    fn domain_to_vec_puts_main_first() {
        let domain = Domain::new("example.com")
            .with_sans(vec!["www.example.com".to_string(), "api.example.com".to_string()]);
        assert_eq!(
            domain.to_vec(),
            vec!["example.com", "www.example.com", "api.example.com"]
        );
    }

    #[test]
    fn key_type_serde_uses_uppercase_names() {
        let json = serde_json::to_string(&KeyType::Ec384).unwrap();
        assert_eq!(json, "\"EC384\"");
        let parsed: KeyType = serde_json::from_str("\"RSA2048\"").unwrap();
        assert_eq!(parsed, KeyType::Rsa2048);
    }

    #[test]
    fn key_type_defaults_to_rsa4096() {
        assert_eq!(KeyType::default(), KeyType::Rsa4096);
    }

    #[test]
    fn account_matches_compares_ca_by_host() {
        let account = Account {
            email: "ops@example.com".to_string(),
            key_type: KeyType::default(),
            ca_server: "https://acme-v02.api.letsencrypt.org/directory".to_string(),
            credentials: serde_json::json!({"id": "abc"}),
        };
        assert!(account.matches(
            "ops@example.com",
            "https://acme-v02.api.letsencrypt.org/other-path"
        ));
        assert!(!account.matches(
            "ops@example.com",
            "https://acme-staging-v02.api.letsencrypt.org/directory"
        ));
        assert!(!account.matches(
            "other@example.com",
            "https://acme-v02.api.letsencrypt.org/directory"
        ));
    }

    #[test]
    fn http_challenges_prune_empty_token_buckets() {
        let mut data = StoredData::default();
        data.set_http_challenge("token1", "a.example.com", "auth-a");
        data.set_http_challenge("token1", "b.example.com", "auth-b");

        assert_eq!(data.get_http_challenge("token1", "a.example.com"), Some("auth-a"));
        assert_eq!(data.get_http_challenge("token1", "missing.example.com"), None);

        data.remove_http_challenge("token1", "a.example.com");
        assert!(data.http_challenges.contains_key("token1"));
        data.remove_http_challenge("token1", "b.example.com");
        assert!(!data.http_challenges.contains_key("token1"));
    }

    #[test]
    fn stored_data_serializes_pem_as_base64_strings() {
        let mut data = StoredData::default();
        data.certificates.push(Certificate::new(
            Domain::new("example.com"),
            b"not really pem".to_vec(),
            b"not really a key".to_vec(),
        ));

        let value = serde_json::to_value(&data).unwrap();
        assert!(value["Certificates"][0]["Certificate"].is_string());
        assert!(value["Certificates"][0]["Key"].is_string());

        let parsed: StoredData = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn unparseable_certificate_needs_renewal() {
        let cert = Certificate::new(
            Domain::new("example.com"),
            b"garbage".to_vec(),
            b"key".to_vec(),
        );
        assert_eq!(cert.not_after(), None);
        assert!(cert.needs_renewal(Utc::now()));
    }

    #[test]
    fn renewal_triggers_inside_the_thirty_day_window() {
        let soon = Certificate::new(
            Domain::new("example.com"),
            pem_cert_expiring_in(29),
            b"key".to_vec(),
        );
        let later = Certificate::new(
            Domain::new("example.com"),
            pem_cert_expiring_in(31),
            b"key".to_vec(),
        );
        assert!(soon.needs_renewal(Utc::now()));
        assert!(!later.needs_renewal(Utc::now()));
    }
}
