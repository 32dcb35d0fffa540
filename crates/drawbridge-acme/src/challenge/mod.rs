//! Challenge responders for the three ACME validation methods
//!
//! Each responder presents a challenge answer before the CA is told to
//! validate and withdraws it afterwards, whether or not validation
//! succeeded.

pub mod dns01;
pub mod http01;
pub mod tls_alpn01;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ChallengeError;

pub use dns01::Dns01Challenge;
pub use http01::Http01Challenge;
pub use tls_alpn01::{TlsAlpn01Challenge, ACME_TLS_ALPN_PROTOCOL};

/// Ceiling on waiting for the CA to validate an answered challenge.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause between polls of a pending order.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Publishes and withdraws the proof material for one challenge method.
#[async_trait]
pub trait ChallengeHandler: Send + Sync {
    /// Advisory validation ceiling and poll interval for orders answered
    /// through this responder.
    fn timeout(&self) -> (Duration, Duration) {
        (DEFAULT_VALIDATION_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    /// Publishes the proof the CA will look for.
    async fn present(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), ChallengeError>;

    /// Removes the proof after validation, successful or not.
    async fn cleanup(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), ChallengeError>;
}
