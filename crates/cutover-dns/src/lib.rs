//! Cutover DNS layer
//!
//! - [`change`]: the `DnsChange` record-mutation model and its lifecycle
//! - [`provider`]: the async `DnsProvider` contract the engine depends on
//! - [`manual`]: the no-I/O manual provider and instruction rendering
//! - [`registry`]: the explicit name → provider registry
//! - [`fakes`]: in-memory call-recording provider for tests

pub mod change;
pub mod error;
pub mod fakes;
pub mod manual;
pub mod provider;
pub mod registry;

pub use change::{DnsChange, DnsChangeStatus, RecordType};
pub use error::{DnsError, DnsResult};
pub use manual::{
    render_apply_steps, render_instructions, render_rollback_steps, ManualProvider,
    MANUAL_PROVIDER,
};
pub use provider::{DnsProvider, DnsRecord};
pub use registry::ProviderRegistry;
