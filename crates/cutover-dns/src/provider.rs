//! DNS provider contract.
//!
//! The orchestration engine only ever talks to this trait. Concrete vendor
//! clients live outside this workspace; the [`crate::manual::ManualProvider`]
//! is the one implementation shipped here, plus the in-memory
//! [`crate::fakes::RecordingProvider`] used by tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::change::{DnsChange, RecordType};
use crate::error::DnsResult;

/// A DNS record as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned identifier
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Fully-qualified record name
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl DnsRecord {
    /// Build the record a provider would hold after applying `change`.
    pub fn from_change(id: impl Into<String>, change: &DnsChange) -> Self {
        Self {
            id: id.into(),
            record_type: change.record_type,
            name: change.fqdn(),
            content: change.new_value.clone(),
            ttl: change.ttl,
            proxied: change.proxied,
        }
    }
}

/// Capability set every DNS provider must offer.
///
/// Implementations must be safe to share across concurrently running plans;
/// they must not keep plan-specific mutable state.
///
/// Every method may fail with a provider-specific [`crate::DnsError`]; callers
/// treat all of them alike.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Registry name of this provider (e.g. `manual`).
    fn name(&self) -> &str;

    /// List all records in `domain`.
    async fn list_records(&self, domain: &str) -> DnsResult<Vec<DnsRecord>>;

    /// Fetch a single record by provider id.
    async fn get_record(&self, domain: &str, record_id: &str) -> DnsResult<DnsRecord>;

    /// Create the record described by `change`.
    ///
    /// On success the provider records the assigned id on the change and
    /// marks it applied.
    async fn create_record(&self, change: &mut DnsChange) -> DnsResult<DnsRecord>;

    /// Point the record described by `change` at `change.new_value`.
    ///
    /// Must create the record when `change.provider_record_id` is unknown.
    /// Marks the change applied on success.
    async fn update_record(&self, change: &mut DnsChange) -> DnsResult<()>;

    /// Delete a record by provider id.
    async fn delete_record(&self, domain: &str, record_id: &str) -> DnsResult<()>;

    /// Check that the configured credentials are accepted.
    async fn validate_credentials(&self) -> DnsResult<()>;
}
