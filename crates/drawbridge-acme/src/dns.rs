//! DNS provider integrations for the DNS-01 challenge

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudflare::endpoints::{dns, zones};
use cloudflare::framework::auth::Credentials;
use cloudflare::framework::client::async_api::Client;
use cloudflare::framework::client::ClientConfig;
use cloudflare::framework::Environment;
use tracing::{debug, warn};

use crate::config::DnsChallengeConfig;
use crate::errors::DnsError;

const TXT_RECORD_TTL: u32 = 120;

/// Creates and removes the TXT records that answer DNS-01 challenges.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound on how long the provider's records take to propagate.
    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }

    /// `fqdn` is the record name without a trailing dot.
    async fn create_txt_record(&self, fqdn: &str, value: &str) -> Result<(), DnsError>;

    async fn delete_txt_record(&self, fqdn: &str, value: &str) -> Result<(), DnsError>;
}

/// Builds the provider named in the challenge configuration.
pub fn provider_from_config(config: &DnsChallengeConfig) -> Result<Arc<dyn DnsProvider>, DnsError> {
    match config.provider.as_str() {
        "cloudflare" => {
            let token = config.api_token.clone().ok_or_else(|| {
                DnsError::InvalidCredentials("Cloudflare requires an API token".to_string())
            })?;
            Ok(Arc::new(CloudflareProvider::new(token)?))
        }
        "manual" => Ok(Arc::new(ManualProvider)),
        other => Err(DnsError::UnknownProvider(other.to_string())),
    }
}

/// Cloudflare DNS, authenticated with a scoped API token.
pub struct CloudflareProvider {
    client: Client,
}

impl CloudflareProvider {
    pub fn new(api_token: impl Into<String>) -> Result<Self, DnsError> {
        let credentials = Credentials::UserAuthToken {
            token: api_token.into(),
        };
        let client = Client::new(credentials, ClientConfig::default(), Environment::Production)
            .map_err(|e| DnsError::InvalidCredentials(e.to_string()))?;
        Ok(Self { client })
    }

    async fn zone_id(&self, fqdn: &str) -> Result<String, DnsError> {
        let base = base_domain(fqdn);
        let response = self
            .client
            .request(&zones::zone::ListZones {
                params: zones::zone::ListZonesParams {
                    name: Some(base.clone()),
                    ..Default::default()
                },
            })
            .await
            .map_err(|e| DnsError::Api(e.to_string()))?;
        response
            .result
            .first()
            .map(|zone| zone.id.to_string())
            .ok_or(DnsError::ZoneNotFound(base))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> Result<(), DnsError> {
        let zone_id = self.zone_id(fqdn).await?;
        self.client
            .request(&dns::dns::CreateDnsRecord {
                zone_identifier: &zone_id,
                params: dns::dns::CreateDnsRecordParams {
                    name: fqdn,
                    content: dns::dns::DnsContent::TXT {
                        content: value.to_string(),
                    },
                    ttl: Some(TXT_RECORD_TTL),
                    priority: None,
                    proxied: Some(false),
                },
            })
            .await
            .map_err(|e| DnsError::Api(e.to_string()))?;
        debug!("Created TXT record {} in zone {}", fqdn, zone_id);
        Ok(())
    }

    async fn delete_txt_record(&self, fqdn: &str, _value: &str) -> Result<(), DnsError> {
        let zone_id = self.zone_id(fqdn).await?;
        let records = self
            .client
            .request(&dns::dns::ListDnsRecords {
                zone_identifier: &zone_id,
                params: dns::dns::ListDnsRecordsParams {
                    name: Some(fqdn.to_string()),
                    record_type: Some(dns::dns::DnsContent::TXT {
                        content: String::new(),
                    }),
                    ..Default::default()
                },
            })
            .await
            .map_err(|e| DnsError::Api(e.to_string()))?;

        for record in records
            .result
            .iter()
            .filter(|record| matches!(record.content, dns::dns::DnsContent::TXT { .. }))
        {
            self.client
                .request(&dns::dns::DeleteDnsRecord {
                    zone_identifier: &zone_id,
                    identifier: &record.id,
                })
                .await
                .map_err(|e| DnsError::Api(e.to_string()))?;
            debug!("Deleted TXT record {} from zone {}", record.id, zone_id);
        }
        Ok(())
    }
}

/// Logs the record so an operator can provision it out of band.
pub struct ManualProvider;

#[async_trait]
impl DnsProvider for ManualProvider {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str) -> Result<(), DnsError> {
        warn!(
            "Manual DNS provider: create a TXT record {} with value {}",
            fqdn, value
        );
        Ok(())
    }

    async fn delete_txt_record(&self, fqdn: &str, value: &str) -> Result<(), DnsError> {
        warn!(
            "Manual DNS provider: the TXT record {} with value {} can be removed",
            fqdn, value
        );
        Ok(())
    }
}

/// Last two labels of a record name, the zone for the common
/// `example.com` case. Deeper zone delegation is not supported.
fn base_domain(fqdn: &str) -> String {
    let mut labels: Vec<&str> = fqdn.trim_end_matches('.').rsplit('.').take(2).collect();
    labels.reverse();
    labels.join(".")
}
