//! Contract tests for the DnsProvider trait.
//!
//! Exercised against the in-memory fake and the manual provider; any
//! conforming provider must satisfy the same behaviour.

use cutover_dns::fakes::{ProviderCall, RecordingProvider};
use cutover_dns::{
    DnsChange, DnsChangeStatus, DnsError, DnsProvider, ManualProvider, ProviderRegistry,
    RecordType,
};

fn change(id: &str, new_value: &str) -> DnsChange {
    DnsChange::new(id, "example.com", RecordType::A, "www", "1.1.1.1", new_value)
}

#[tokio::test]
async fn update_creates_when_record_id_unknown() {
    let provider = RecordingProvider::new("fake");
    let mut c = change("c1", "2.2.2.2");
    assert!(c.provider_record_id.is_none());

    provider.update_record(&mut c).await.unwrap();

    assert_eq!(c.status, DnsChangeStatus::Applied);
    let id = c.provider_record_id.clone().expect("record id assigned");
    let record = provider.get_record("example.com", &id).await.unwrap();
    assert_eq!(record.content, "2.2.2.2");
    assert_eq!(record.name, "www.example.com");
}

#[tokio::test]
async fn update_reuses_known_record_id() {
    let provider = RecordingProvider::new("fake");
    let mut c = change("c1", "2.2.2.2");
    provider.update_record(&mut c).await.unwrap();

    let mut reverted = c.reversed();
    provider.update_record(&mut reverted).await.unwrap();

    assert_eq!(provider.record_count(), 1);
    let id = reverted.provider_record_id.clone().unwrap();
    let record = provider.get_record("example.com", &id).await.unwrap();
    assert_eq!(record.content, "1.1.1.1");
}

#[tokio::test]
async fn injected_failure_leaves_change_untouched() {
    let provider = RecordingProvider::new("fake");
    provider.fail_on_value("9.9.9.9");
    let mut c = change("c1", "9.9.9.9");

    let err = provider.update_record(&mut c).await.unwrap_err();
    assert!(matches!(err, DnsError::Api(_)));
    assert_eq!(c.status, DnsChangeStatus::Pending);
    assert_eq!(provider.write_calls().len(), 1);
}

#[tokio::test]
async fn list_and_delete_records() {
    let provider = RecordingProvider::new("fake");
    let mut a = change("a", "2.2.2.2");
    let mut b = DnsChange::new("b", "other.org", RecordType::A, "@", "", "3.3.3.3");
    provider.create_record(&mut a).await.unwrap();
    provider.create_record(&mut b).await.unwrap();

    let listed = provider.list_records("example.com").await.unwrap();
    assert_eq!(listed.len(), 1);

    let id = a.provider_record_id.clone().unwrap();
    provider.delete_record("example.com", &id).await.unwrap();
    assert!(provider.list_records("example.com").await.unwrap().is_empty());
    assert!(matches!(
        provider.delete_record("example.com", &id).await,
        Err(DnsError::RecordNotFound { .. })
    ));
}

#[tokio::test]
async fn credential_rejection_is_reported() {
    let provider = RecordingProvider::new("fake");
    assert!(provider.validate_credentials().await.is_ok());
    provider.reject_credentials();
    assert!(matches!(
        provider.validate_credentials().await,
        Err(DnsError::Credentials(_))
    ));
    assert_eq!(
        provider.calls(),
        vec![ProviderCall::ValidateCredentials, ProviderCall::ValidateCredentials]
    );
}

#[tokio::test]
async fn manual_provider_through_registry() {
    let registry = ProviderRegistry::with_manual();
    let mut c = change("c1", "2.2.2.2");
    let provider = registry.resolve(None, &c).unwrap();
    assert_eq!(provider.name(), "manual");

    provider.update_record(&mut c).await.unwrap();
    assert!(c.can_rollback());

    let direct = ManualProvider::new();
    assert!(direct.get_record("example.com", "x").await.is_err());
}
