//! Error types for certificate automation

use thiserror::Error;

/// Errors surfaced by the certificate store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage file {path} has permissions 0{mode:o}, expected 0600")]
    Permissions { path: String, mode: u32 },

    #[error("Concurrent modification of {0}")]
    Conflict(String),

    #[error("Key-value backend error: {0}")]
    Kv(#[from] drawbridge_kv::KvError),
}

/// Errors raised while answering a single challenge.
#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("No key authorization for token {token} and domain {domain}")]
    TokenNotFound { token: String, domain: String },

    #[error("Failed to present challenge for {domain}: {reason}")]
    Presentation { domain: String, reason: String },

    #[error("Challenge record for {domain} did not propagate within {seconds}s")]
    Propagation { domain: String, seconds: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("DNS provider error: {0}")]
    Dns(#[from] DnsError),
}

/// Errors from DNS provider integrations.
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Unknown DNS provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid DNS provider credentials: {0}")]
    InvalidCredentials(String),

    #[error("No DNS zone found for {0}")]
    ZoneNotFound(String),

    #[error("DNS provider API error: {0}")]
    Api(String),
}

/// Errors from the rustls glue layer.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to parse certificate PEM: {0}")]
    InvalidCertificate(String),

    #[error("Failed to parse private key: {0}")]
    InvalidKey(String),

    #[error("No process-level crypto provider installed")]
    NoCryptoProvider,

    #[error("Certificate generation failed: {0}")]
    Generation(String),
}

/// Missing pieces detected while assembling the service.
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Configuration is required")]
    MissingConfig,

    #[error("Certificate store is required")]
    MissingStore,
}

/// Top-level error for certificate resolution.
#[derive(Error, Debug)]
pub enum AcmeError {
    #[error("Invalid domain {domain}: {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("No challenge mechanism configured")]
    NoChallengeConfigured,

    #[error("Wildcard domain {0} requires the DNS challenge")]
    WildcardRequiresDns(String),

    #[error("Account error: {0}")]
    Account(String),

    #[error("Order for {domains} failed: {reason}")]
    Order { domains: String, reason: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ACME client error: {0}")]
    Client(#[from] instant_acme::Error),

    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("DNS provider error: {0}")]
    Dns(#[from] DnsError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Service builder error: {0}")]
    Builder(#[from] BuilderError),
}
