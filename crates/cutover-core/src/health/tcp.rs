//! TCP connect probe, also used for database reachability.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::domain::health::{HealthCheck, HealthCheckResult};
use crate::health::endpoint;

/// Connect to the check's `host:port` endpoint (scheme optional).
pub async fn probe(check: &HealthCheck, timeout: Duration) -> HealthCheckResult {
    let (host, port) = endpoint::host_port(&check.endpoint);
    let Some(port) = port else {
        return HealthCheckResult::fail(
            &check.id,
            format!("tcp endpoint {:?} has no port", check.endpoint),
        );
    };
    connect(check, &host, port, timeout).await
}

/// Open and immediately drop a connection to `host:port`.
pub async fn connect(
    check: &HealthCheck,
    host: &str,
    port: u16,
    timeout: Duration,
) -> HealthCheckResult {
    let address = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            let mut result = HealthCheckResult::pass(&check.id);
            if let Ok(peer) = stream.peer_addr() {
                result = result.with_detail("peer", peer.to_string());
            }
            result.with_detail("address", address)
        }
        Ok(Err(e)) => HealthCheckResult::fail(&check.id, format!("connect to {address} failed: {e}"))
            .with_detail("address", address),
        Err(_) => HealthCheckResult::fail(
            &check.id,
            format!("connect to {address} timed out after {}s", timeout.as_secs()),
        )
        .with_detail("address", address),
    }
}
