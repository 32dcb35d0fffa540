//! ACME account bootstrap

use instant_acme::{Account, NewAccount};
use tracing::{info, warn};

use crate::config::AcmeConfig;
use crate::errors::AcmeError;
use crate::store::Store;
use crate::types;

/// Returns a usable ACME account, registering one when the store holds
/// none that matches the configured email and CA.
///
/// The CA endpoint is compared by host, so switching CAs invalidates the
/// stored account while a path change on the same CA does not. New
/// credentials are persisted before the account is used, registration
/// on every start would trip the CA's rate limits otherwise.
pub async fn ensure_account(store: &dyn Store, config: &AcmeConfig) -> Result<Account, AcmeError> {
    let data = store.load().await?;

    if let Some(stored) = data.account {
        if stored.matches(&config.email, &config.ca_server) {
            let credentials = serde_json::from_value(stored.credentials).map_err(|e| {
                AcmeError::Account(format!("Stored credentials are invalid: {}", e))
            })?;
            let account = Account::from_credentials(credentials)
                .await
                .map_err(|e| AcmeError::Account(format!("Failed to restore account: {}", e)))?;
            info!("Reusing stored ACME account for {}", config.email);
            return Ok(account);
        }
        warn!(
            "Stored ACME account for {} at {} does not match the configuration, registering a new one",
            stored.email, stored.ca_server
        );
    }

    let contact = format!("mailto:{}", config.email);
    let new_account = NewAccount {
        contact: &[contact.as_str()],
        terms_of_service_agreed: true,
        only_return_existing: false,
    };
    let (account, credentials) = Account::create(&new_account, &config.ca_server, None)
        .await
        .map_err(|e| AcmeError::Account(format!("Registration failed: {}", e)))?;

    let credentials = serde_json::to_value(credentials)
        .map_err(|e| AcmeError::Account(format!("Failed to encode credentials: {}", e)))?;

    let mut txn = store.begin().await?;
    txn.data().account = Some(types::Account {
        email: config.email.clone(),
        key_type: config.key_type,
        ca_server: config.ca_server.clone(),
        credentials,
    });
    txn.commit().await?;

    info!(
        "Registered new ACME account for {} at {}",
        config.email, config.ca_server
    );
    Ok(account)
}
