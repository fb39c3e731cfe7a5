//! Manual DNS provider.
//!
//! Performs no network I/O. Applying a change simply marks it applied; the
//! operator is expected to make the change by hand from the instructions
//! produced by [`render_instructions`].

use async_trait::async_trait;
use std::fmt::Write as _;
use tracing::info;

use crate::change::DnsChange;
use crate::error::{DnsError, DnsResult};
use crate::provider::{DnsProvider, DnsRecord};

/// Registry name of the manual provider.
pub const MANUAL_PROVIDER: &str = "manual";

/// Provider that only records intent.
#[derive(Debug, Default, Clone)]
pub struct ManualProvider;

impl ManualProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DnsProvider for ManualProvider {
    fn name(&self) -> &str {
        MANUAL_PROVIDER
    }

    async fn list_records(&self, _domain: &str) -> DnsResult<Vec<DnsRecord>> {
        Ok(Vec::new())
    }

    async fn get_record(&self, domain: &str, record_id: &str) -> DnsResult<DnsRecord> {
        Err(DnsError::RecordNotFound {
            domain: domain.to_string(),
            id: record_id.to_string(),
        })
    }

    async fn create_record(&self, change: &mut DnsChange) -> DnsResult<DnsRecord> {
        let id = match &change.provider_record_id {
            Some(id) => id.clone(),
            None => format!("manual-{}", change.id),
        };
        change.provider_record_id = Some(id.clone());
        change.mark_applied();
        info!(change_id = %change.id, fqdn = %change.fqdn(), "Manual DNS change recorded");
        Ok(DnsRecord::from_change(id, change))
    }

    async fn update_record(&self, change: &mut DnsChange) -> DnsResult<()> {
        self.create_record(change).await.map(|_| ())
    }

    async fn delete_record(&self, _domain: &str, _record_id: &str) -> DnsResult<()> {
        Ok(())
    }

    async fn validate_credentials(&self) -> DnsResult<()> {
        Ok(())
    }
}

/// Render the numbered "apply" instructions for `changes`, in order.
pub fn render_apply_steps(changes: &[DnsChange]) -> String {
    let mut out = String::new();
    for (i, change) in changes.iter().enumerate() {
        let _ = writeln!(out, "  {}. Update {} record {}", i + 1, change.record_type, change.fqdn());
        let old = if change.old_value.is_empty() {
            "(none)"
        } else {
            change.old_value.as_str()
        };
        let _ = writeln!(out, "     Old value: {}", old);
        let _ = writeln!(out, "     New value: {}", change.new_value);
        let _ = writeln!(out, "     TTL: {}", change.ttl);
        if change.proxied {
            let _ = writeln!(out, "     Proxied: yes");
        }
    }
    out
}

/// Render the numbered rollback instructions for `changes`, last change first.
pub fn render_rollback_steps(changes: &[DnsChange]) -> String {
    let mut out = String::new();
    for (i, change) in changes.iter().rev().enumerate() {
        let _ = writeln!(out, "  {}. Revert {} record {}", i + 1, change.record_type, change.fqdn());
        if change.old_value.is_empty() {
            let _ = writeln!(out, "     Delete the record (value {})", change.new_value);
        } else {
            let _ = writeln!(out, "     Set value back to: {}", change.old_value);
            let _ = writeln!(out, "     (currently {})", change.new_value);
        }
        let _ = writeln!(out, "     TTL: {}", change.ttl);
    }
    out
}

/// Render complete operator instructions for applying and reverting `changes`.
pub fn render_instructions(changes: &[DnsChange]) -> String {
    if changes.is_empty() {
        return "No DNS changes required.\n".to_string();
    }
    let mut out = String::new();
    out.push_str("Apply the following DNS changes in order:\n");
    out.push_str(&render_apply_steps(changes));
    out.push('\n');
    out.push_str("To roll back, apply in reverse order:\n");
    out.push_str(&render_rollback_steps(changes));
    out
}
