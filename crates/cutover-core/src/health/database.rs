//! Database reachability probe.
//!
//! Infers the engine from the connection string scheme and checks that
//! its port accepts TCP connections. No query is sent.

use std::time::Duration;

use crate::domain::health::{CheckKind, HealthCheck, HealthCheckResult};
use crate::health::endpoint::{self, DatabaseEngine};
use crate::health::tcp;

pub async fn probe(check: &HealthCheck, timeout: Duration) -> HealthCheckResult {
    let engine = DatabaseEngine::from_endpoint(&check.endpoint);
    let (host, port) = endpoint::host_port(&check.endpoint);
    if host.is_empty() {
        return HealthCheckResult::fail(&check.id, "database check has no host");
    }
    let port = port.unwrap_or_else(|| engine.default_port());

    let mut result = tcp::connect(check, &host, port, timeout)
        .await
        .with_detail("engine", engine.as_str());
    if let CheckKind::Database { query: Some(query) } = &check.kind {
        result = result.with_detail("query_skipped", query.as_str());
    }
    result
}
