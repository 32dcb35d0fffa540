//! Configuration for the certificate resolver

use serde::{Deserialize, Serialize};

use crate::errors::AcmeError;
use crate::types::{Domain, KeyType};

/// Production Let's Encrypt directory endpoint.
pub const DEFAULT_CA_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Staging Let's Encrypt directory endpoint, for integration testing.
pub const STAGING_CA_SERVER: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// How often the renewal loop sweeps the stored certificates.
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 86_400;

/// Top-level certificate automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// Contact email registered with the CA.
    pub email: String,
    #[serde(default = "default_ca_server")]
    pub ca_server: String,
    /// Where account and certificates are persisted. A file path for the
    /// local store, or a key name for the key-value store.
    pub storage: String,
    #[serde(default)]
    pub key_type: KeyType,
    /// Domains provisioned eagerly at startup.
    #[serde(default)]
    pub domains: Vec<Domain>,
    /// Obtain certificates on demand for unknown SNI names.
    #[serde(default = "default_on_demand")]
    pub on_demand: bool,
    #[serde(default)]
    pub http_challenge: Option<HttpChallengeConfig>,
    #[serde(default)]
    pub tls_challenge: Option<TlsChallengeConfig>,
    #[serde(default)]
    pub dns_challenge: Option<DnsChallengeConfig>,
    #[serde(default = "default_renewal_interval")]
    pub renewal_interval: u64,
}

impl AcmeConfig {
    pub fn new(email: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ca_server: default_ca_server(),
            storage: storage.into(),
            key_type: KeyType::default(),
            domains: Vec::new(),
            on_demand: default_on_demand(),
            http_challenge: None,
            tls_challenge: None,
            dns_challenge: None,
            renewal_interval: default_renewal_interval(),
        }
    }

    pub fn with_ca_server(mut self, ca_server: impl Into<String>) -> Self {
        self.ca_server = ca_server.into();
        self
    }

    /// Points the account and all orders at the staging endpoint.
    pub fn with_staging(self) -> Self {
        self.with_ca_server(STAGING_CA_SERVER)
    }

    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    pub fn with_domains(mut self, domains: Vec<Domain>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }

    pub fn with_http_challenge(mut self, config: HttpChallengeConfig) -> Self {
        self.http_challenge = Some(config);
        self
    }

    pub fn with_tls_challenge(mut self) -> Self {
        self.tls_challenge = Some(TlsChallengeConfig::default());
        self
    }

    pub fn with_dns_challenge(mut self, config: DnsChallengeConfig) -> Self {
        self.dns_challenge = Some(config);
        self
    }

    pub fn with_renewal_interval(mut self, seconds: u64) -> Self {
        self.renewal_interval = seconds;
        self
    }

    pub fn validate(&self) -> Result<(), AcmeError> {
        if self.email.is_empty() {
            return Err(AcmeError::Config("Contact email is required".to_string()));
        }
        if self.storage.is_empty() {
            return Err(AcmeError::Config(
                "Storage location is required".to_string(),
            ));
        }
        if self.http_challenge.is_none()
            && self.tls_challenge.is_none()
            && self.dns_challenge.is_none()
        {
            return Err(AcmeError::NoChallengeConfigured);
        }
        if let Some(dns) = &self.dns_challenge {
            if dns.provider.is_empty() {
                return Err(AcmeError::Config(
                    "DNS challenge requires a provider name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Settings for the HTTP-01 challenge responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpChallengeConfig {
    /// Name of the listener the challenge routes are mounted on. The
    /// listener must be reachable on port 80 for the CA to validate.
    #[serde(default = "default_http_entry_point")]
    pub entry_point: String,
}

impl Default for HttpChallengeConfig {
    fn default() -> Self {
        Self {
            entry_point: default_http_entry_point(),
        }
    }
}

/// Marker enabling the TLS-ALPN-01 challenge on the TLS listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsChallengeConfig {}

/// Settings for the DNS-01 challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsChallengeConfig {
    /// Provider name, e.g. "cloudflare" or "manual".
    pub provider: String,
    /// Extra seconds to wait after creating the TXT record, before any
    /// propagation check runs.
    #[serde(default)]
    pub delay_before_check: u64,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Name servers the propagation check queries, as `ip` or `ip:port`.
    /// Public resolvers are used when empty.
    #[serde(default)]
    pub resolvers: Vec<String>,
    /// Skip querying resolvers for the TXT record before telling the CA
    /// to validate.
    #[serde(default)]
    pub disable_propagation_check: bool,
}

impl DnsChallengeConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            delay_before_check: 0,
            api_token: None,
            resolvers: Vec::new(),
            disable_propagation_check: false,
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_delay_before_check(mut self, seconds: u64) -> Self {
        self.delay_before_check = seconds;
        self
    }

    pub fn with_resolvers(mut self, resolvers: Vec<String>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_disabled_propagation_check(mut self) -> Self {
        self.disable_propagation_check = true;
        self
    }
}

fn default_ca_server() -> String {
    DEFAULT_CA_SERVER.to_string()
}

fn default_on_demand() -> bool {
    true
}

fn default_renewal_interval() -> u64 {
    DEFAULT_RENEWAL_INTERVAL_SECS
}

fn default_http_entry_point() -> String {
    "http".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config: AcmeConfig = serde_json::from_str(
            r#"{"email": "ops@example.com", "storage": "acme.json"}"#,
        )
        .unwrap();
        assert_eq!(config.ca_server, DEFAULT_CA_SERVER);
        assert_eq!(config.key_type, KeyType::Rsa4096);
        assert!(config.on_demand);
        assert_eq!(config.renewal_interval, DEFAULT_RENEWAL_INTERVAL_SECS);
        assert!(config.http_challenge.is_none());
    }

    #[test]
    fn staging_switches_the_ca_endpoint() {
        let config = AcmeConfig::new("ops@example.com", "acme.json").with_staging();
        assert_eq!(config.ca_server, STAGING_CA_SERVER);
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let config = AcmeConfig::new("", "acme.json");
        assert!(config.validate().is_err());

        let config = AcmeConfig::new("ops@example.com", "");
        assert!(config.validate().is_err());

        let config = AcmeConfig::new("ops@example.com", "acme.json")
            .with_dns_challenge(DnsChallengeConfig::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_a_challenge() {
        let config = AcmeConfig::new("ops@example.com", "acme.json");
        assert!(matches!(
            config.validate(),
            Err(AcmeError::NoChallengeConfigured)
        ));

        let config = config.with_http_challenge(HttpChallengeConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dns_challenge_builder_sets_options() {
        let dns = DnsChallengeConfig::new("cloudflare")
            .with_api_token("secret")
            .with_delay_before_check(30)
            .with_resolvers(vec!["1.1.1.1".to_string()])
            .with_disabled_propagation_check();
        assert_eq!(dns.provider, "cloudflare");
        assert_eq!(dns.api_token.as_deref(), Some("secret"));
        assert_eq!(dns.delay_before_check, 30);
        assert_eq!(dns.resolvers, vec!["1.1.1.1"]);
        assert!(dns.disable_propagation_check);
    }
}
