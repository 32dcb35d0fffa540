//! Automated TLS certificate management for the proxy
//!
//! Certificates are obtained from an ACME CA (Let's Encrypt by default),
//! persisted next to the account in a JSON document, renewed ahead of
//! expiry and published to the TLS listener through a snapshot channel.
//! HTTP-01, TLS-ALPN-01 and DNS-01 challenges are supported.

pub mod account;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod errors;
pub mod handlers;
pub mod issuer;
pub mod registry;
pub mod service;
pub mod store;
pub mod tls;
pub mod types;
pub mod validation;

pub use config::{
    AcmeConfig, DnsChallengeConfig, HttpChallengeConfig, TlsChallengeConfig, DEFAULT_CA_SERVER,
    STAGING_CA_SERVER,
};
pub use errors::{AcmeError, BuilderError, ChallengeError, DnsError, StoreError, TlsError};
pub use service::{AcmeService, AcmeServiceBuilder, CertificateSnapshot};
pub use store::{KvStore, LocalStore, Store, StoreTransaction};
pub use types::{Account, Certificate, ChallengeCert, Domain, KeyType, StoredData};
