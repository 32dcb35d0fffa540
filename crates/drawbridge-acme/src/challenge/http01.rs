//! HTTP-01 challenge state shared through the store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drawbridge_core::backoff::Backoff;
use tracing::debug;

use super::ChallengeHandler;
use crate::errors::ChallengeError;
use crate::store::Store;

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Publishes HTTP-01 key authorizations through the certificate store.
///
/// Going through the store means any instance sharing it can answer the
/// CA's probe, no matter which instance requested the certificate.
pub struct Http01Challenge {
    store: Arc<dyn Store>,
    lookup_timeout: Duration,
}

impl Http01Challenge {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Looks up the key authorization for a probe.
    ///
    /// Retries for a while because the peer that requested the
    /// certificate may not have committed the token yet when the CA's
    /// probe arrives here.
    pub async fn key_authorization(
        &self,
        token: &str,
        domain: &str,
    ) -> Result<String, ChallengeError> {
        Backoff::new(self.lookup_timeout)
            .retry("HTTP-01 key authorization lookup", || async {
                let data = self.store.load().await?;
                data.get_http_challenge(token, domain)
                    .map(str::to_string)
                    .ok_or_else(|| ChallengeError::TokenNotFound {
                        token: token.to_string(),
                        domain: domain.to_string(),
                    })
            })
            .await
    }
}

#[async_trait]
impl ChallengeHandler for Http01Challenge {
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<(), ChallengeError> {
        let mut txn = self.store.begin().await?;
        txn.data().set_http_challenge(token, domain, key_auth);
        txn.commit().await?;
        debug!("Stored HTTP-01 key authorization for {}", domain);
        Ok(())
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        _key_auth: &str,
    ) -> Result<(), ChallengeError> {
        let mut txn = self.store.begin().await?;
        txn.data().remove_http_challenge(token, domain);
        txn.commit().await?;
        debug!("Removed HTTP-01 key authorization for {}", domain);
        Ok(())
    }
}
