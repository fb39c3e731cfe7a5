//! Error types for cutover-dns

use thiserror::Error;

/// Errors produced by DNS providers and the provider registry.
#[derive(Error, Debug)]
pub enum DnsError {
    /// No provider is registered under the requested name
    #[error("DNS provider not found: {name}")]
    ProviderNotFound { name: String },

    /// Record lookup failed at the provider
    #[error("DNS record not found in {domain}: {id}")]
    RecordNotFound { domain: String, id: String },

    /// Change failed structural validation
    #[error("invalid DNS change {id}: {reason}")]
    InvalidChange { id: String, reason: String },

    /// Provider rejected the configured credentials
    #[error("invalid provider credentials: {0}")]
    Credentials(String),

    /// Provider API returned an error response
    #[error("provider API error: {0}")]
    Api(String),

    /// Transport-level failure talking to the provider
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Convenience result alias.
pub type DnsResult<T> = std::result::Result<T, DnsError>;
