//! In-memory fakes for the provider contract (testing only)
//!
//! [`RecordingProvider`] keeps records in a `HashMap`, records every call in
//! order, and can be told to fail specific changes or credential checks.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::change::DnsChange;
use crate::error::{DnsError, DnsResult};
use crate::provider::{DnsProvider, DnsRecord};

/// One observed provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    List {
        domain: String,
    },
    Get {
        domain: String,
        record_id: String,
    },
    Create {
        change_id: String,
        fqdn: String,
        old_value: String,
        new_value: String,
    },
    Update {
        change_id: String,
        fqdn: String,
        old_value: String,
        new_value: String,
    },
    Delete {
        domain: String,
        record_id: String,
    },
    ValidateCredentials,
}

#[derive(Debug, Default)]
struct FakeState {
    records: HashMap<String, DnsRecord>,
    calls: Vec<ProviderCall>,
    failing_values: HashSet<String>,
    reject_credentials: bool,
    next_id: u64,
}

/// Call-recording in-memory provider.
#[derive(Debug)]
pub struct RecordingProvider {
    name: String,
    state: Mutex<FakeState>,
}

impl RecordingProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail any create/update whose target `new_value` equals `value`.
    pub fn fail_on_value(&self, value: impl Into<String>) {
        self.state().failing_values.insert(value.into());
    }

    /// Make `validate_credentials` fail.
    pub fn reject_credentials(&self) {
        self.state().reject_credentials = true;
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    /// Only the create/update calls, in order.
    pub fn write_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::Create { .. } | ProviderCall::Update { .. }))
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state().records.len()
    }

    fn upsert(&self, change: &mut DnsChange) -> DnsResult<DnsRecord> {
        let mut state = self.state();
        if state.failing_values.contains(&change.new_value) {
            return Err(DnsError::Api(format!(
                "injected failure for {} -> {}",
                change.fqdn(),
                change.new_value
            )));
        }
        let id = match change.provider_record_id.clone() {
            Some(id) => id,
            None => {
                state.next_id += 1;
                format!("{}-{}", self.name, state.next_id)
            }
        };
        let record = DnsRecord::from_change(id.clone(), change);
        state.records.insert(id.clone(), record.clone());
        change.provider_record_id = Some(id);
        change.mark_applied();
        Ok(record)
    }
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_records(&self, domain: &str) -> DnsResult<Vec<DnsRecord>> {
        let mut state = self.state();
        state.calls.push(ProviderCall::List {
            domain: domain.to_string(),
        });
        let suffix = domain.trim_end_matches('.');
        let mut records: Vec<DnsRecord> = state
            .records
            .values()
            .filter(|r| r.name == suffix || r.name.ends_with(&format!(".{suffix}")))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn get_record(&self, domain: &str, record_id: &str) -> DnsResult<DnsRecord> {
        let mut state = self.state();
        state.calls.push(ProviderCall::Get {
            domain: domain.to_string(),
            record_id: record_id.to_string(),
        });
        state
            .records
            .get(record_id)
            .cloned()
            .ok_or_else(|| DnsError::RecordNotFound {
                domain: domain.to_string(),
                id: record_id.to_string(),
            })
    }

    async fn create_record(&self, change: &mut DnsChange) -> DnsResult<DnsRecord> {
        self.state().calls.push(ProviderCall::Create {
            change_id: change.id.clone(),
            fqdn: change.fqdn(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
        });
        self.upsert(change)
    }

    async fn update_record(&self, change: &mut DnsChange) -> DnsResult<()> {
        self.state().calls.push(ProviderCall::Update {
            change_id: change.id.clone(),
            fqdn: change.fqdn(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
        });
        self.upsert(change).map(|_| ())
    }

    async fn delete_record(&self, domain: &str, record_id: &str) -> DnsResult<()> {
        let mut state = self.state();
        state.calls.push(ProviderCall::Delete {
            domain: domain.to_string(),
            record_id: record_id.to_string(),
        });
        state
            .records
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| DnsError::RecordNotFound {
                domain: domain.to_string(),
                id: record_id.to_string(),
            })
    }

    async fn validate_credentials(&self) -> DnsResult<()> {
        let mut state = self.state();
        state.calls.push(ProviderCall::ValidateCredentials);
        if state.reject_credentials {
            return Err(DnsError::Credentials(format!(
                "{} rejected the configured token",
                self.name
            )));
        }
        Ok(())
    }
}
