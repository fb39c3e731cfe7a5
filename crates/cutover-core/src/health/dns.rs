//! DNS resolution probe.

use std::time::Duration;

use crate::domain::health::{CheckKind, HealthCheck, HealthCheckResult};
use crate::health::endpoint;

/// Resolve the endpoint's hostname and, when an expected value is set,
/// require it among the resolved addresses.
pub async fn probe(check: &HealthCheck, timeout: Duration) -> HealthCheckResult {
    let expected = match &check.kind {
        CheckKind::Dns { expected_value } => expected_value.as_deref().map(str::trim),
        _ => return HealthCheckResult::fail(&check.id, "not a dns check"),
    };
    let host = endpoint::hostname(&check.endpoint);
    if host.is_empty() {
        return HealthCheckResult::fail(&check.id, "dns check has no hostname");
    }

    let lookup = tokio::net::lookup_host((host.clone(), 0));
    let addrs = match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => {
            return HealthCheckResult::fail(&check.id, format!("lookup of {host} failed: {e}"))
                .with_detail("hostname", host)
        }
        Err(_) => {
            return HealthCheckResult::fail(
                &check.id,
                format!("lookup of {host} timed out after {}s", timeout.as_secs()),
            )
            .with_detail("hostname", host)
        }
    };

    let mut resolved: Vec<String> = Vec::new();
    for addr in addrs {
        let ip = addr.ip().to_string();
        if !resolved.contains(&ip) {
            resolved.push(ip);
        }
    }

    let mut result = match expected {
        Some(want) if !want.is_empty() && !resolved.iter().any(|ip| ip == want) => {
            HealthCheckResult::fail(
                &check.id,
                format!("{host} resolved to [{}], expected {want}", resolved.join(", ")),
            )
        }
        _ if resolved.is_empty() => {
            HealthCheckResult::fail(&check.id, format!("{host} resolved to no addresses"))
        }
        _ => HealthCheckResult::pass(&check.id),
    };
    result.response = resolved.join("\n");
    result
        .with_detail("hostname", host)
        .with_detail("addresses", resolved)
}
