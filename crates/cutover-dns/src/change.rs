//! DNS change model: one record mutation and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DnsError, DnsResult};

/// Supported DNS record types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
    Ns,
    Srv,
    Caa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a DNS change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DnsChangeStatus {
    #[default]
    Pending,
    Applied,
    Failed,
    RolledBack,
}

impl std::fmt::Display for DnsChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DnsChangeStatus::Pending => "pending",
            DnsChangeStatus::Applied => "applied",
            DnsChangeStatus::Failed => "failed",
            DnsChangeStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// A single DNS record mutation (old value → new value).
///
/// Rollback is expressed as the same change with the values swapped
/// (see [`DnsChange::reversed`]), so reverting goes through exactly the
/// same provider path as applying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsChange {
    pub id: String,
    /// Zone apex, e.g. `example.com`.
    pub domain: String,
    pub record_type: RecordType,
    /// Record name: `@`, a label relative to `domain`, or a fully-qualified name.
    pub name: String,
    #[serde(default)]
    pub old_value: String,
    pub new_value: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    /// Provider used to apply this change (falls back to `manual`).
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider-assigned record identifier, once known.
    #[serde(default)]
    pub provider_record_id: Option<String>,
    #[serde(default)]
    pub status: DnsChangeStatus,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_ttl() -> u32 {
    300
}

impl DnsChange {
    /// Create a pending change with the default TTL of 300 seconds.
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        record_type: RecordType,
        name: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            record_type,
            name: name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            ttl: default_ttl(),
            proxied: false,
            provider: None,
            provider_record_id: None,
            status: DnsChangeStatus::Pending,
            applied_at: None,
            rolled_back_at: None,
            error: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Fully-qualified record name.
    pub fn fqdn(&self) -> String {
        let name = self.name.trim_end_matches('.');
        let domain = self.domain.trim_end_matches('.');
        if name.is_empty() || name == "@" || name == domain {
            domain.to_string()
        } else if name.ends_with(&format!(".{domain}")) {
            name.to_string()
        } else {
            format!("{name}.{domain}")
        }
    }

    /// Only applied changes are eligible for rollback.
    pub fn can_rollback(&self) -> bool {
        self.status == DnsChangeStatus::Applied
    }

    /// A copy of this change with `old_value` and `new_value` swapped.
    pub fn reversed(&self) -> Self {
        let mut reverted = self.clone();
        std::mem::swap(&mut reverted.old_value, &mut reverted.new_value);
        reverted.status = DnsChangeStatus::Pending;
        reverted.applied_at = None;
        reverted.error = None;
        reverted
    }

    pub fn mark_applied(&mut self) {
        self.status = DnsChangeStatus::Applied;
        self.applied_at = Some(Utc::now());
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = DnsChangeStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn mark_rolled_back(&mut self) {
        self.status = DnsChangeStatus::RolledBack;
        self.rolled_back_at = Some(Utc::now());
    }

    /// Structural validation performed before any provider is contacted.
    pub fn validate(&self) -> DnsResult<()> {
        let invalid = |reason: &str| DnsError::InvalidChange {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.domain.trim().is_empty() {
            return Err(invalid("domain must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("record name must not be empty"));
        }
        if self.new_value.trim().is_empty() {
            return Err(invalid("new value must not be empty"));
        }
        if self.ttl == 0 {
            return Err(invalid("ttl must be positive"));
        }
        Ok(())
    }
}
