//! Health checker: executes a [`HealthCheck`] with retries, timeouts, and
//! cancellation, dispatching to one strategy per check kind.

pub mod command;
pub mod database;
pub mod dns;
pub mod endpoint;
pub mod http;
pub mod retry;
pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::HealthCheckerConfig;
use crate::domain::error::{CutoverError, Result};
use crate::domain::health::{CheckKind, HealthCheck, HealthCheckResult};
use crate::metrics::METRICS;

pub use retry::run_with_retries;

/// Executes health checks. The engine holds one behind an `Arc`; tests
/// substitute scripted implementations.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn execute(&self, check: &HealthCheck, cancel: &CancelSignal) -> HealthCheckResult;
}

/// Network/process-backed [`HealthProbe`].
#[derive(Debug, Clone)]
pub struct HealthChecker {
    config: HealthCheckerConfig,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(config: HealthCheckerConfig) -> Result<Self> {
        let client = Self::build_client(&config, false)?;
        let insecure_client = Self::build_client(&config, true)?;
        Ok(Self {
            config,
            client,
            insecure_client,
        })
    }

    fn build_client(config: &HealthCheckerConfig, skip_tls_verify: bool) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .map_err(|e| CutoverError::HealthCheckerSetup(e.to_string()))
    }

    pub fn config(&self) -> &HealthCheckerConfig {
        &self.config
    }

    /// The check's own timeout, else the configured default for its kind.
    fn timeout_for(&self, check: &HealthCheck) -> Duration {
        check.timeout().unwrap_or_else(|| match check.kind {
            CheckKind::Command { .. } => {
                Duration::from_secs(self.config.default_command_timeout_secs)
            }
            _ => Duration::from_secs(self.config.default_tcp_timeout_secs),
        })
    }

    /// One attempt, no retries.
    async fn attempt(&self, check: &HealthCheck) -> HealthCheckResult {
        let timeout = self.timeout_for(check);
        match &check.kind {
            CheckKind::Http {
                skip_tls_verify, ..
            } => {
                let client = if *skip_tls_verify {
                    &self.insecure_client
                } else {
                    &self.client
                };
                http::probe(client, check, timeout, self.config.max_body_bytes).await
            }
            CheckKind::Tcp => tcp::probe(check, timeout).await,
            CheckKind::Dns { .. } => dns::probe(check, timeout).await,
            CheckKind::Database { .. } => database::probe(check, timeout).await,
            CheckKind::Command { .. } => {
                command::probe(check, &self.config.shell, timeout, self.config.max_body_bytes)
                    .await
            }
        }
    }
}

#[async_trait]
impl HealthProbe for HealthChecker {
    async fn execute(&self, check: &HealthCheck, cancel: &CancelSignal) -> HealthCheckResult {
        METRICS.inc_health_checks_run();

        if let Err(e) = check.validate() {
            warn!(check_id = %check.id, error = %e, "Refusing to run invalid health check");
            return HealthCheckResult::fail(&check.id, e.to_string());
        }

        let (result, cancelled) = run_with_retries(check, cancel, |_| self.attempt(check)).await;
        if let Some(reason) = cancelled {
            debug!(check_id = %check.id, attempts = result.attempts, reason = %reason, "Health check stopped");
            return result;
        }
        debug!(
            check_id = %check.id,
            kind = check.kind.name(),
            passed = result.passed,
            attempts = result.attempts,
            duration_ms = result.duration_ms,
            "Health check finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn checker() -> HealthChecker {
        HealthChecker::new(HealthCheckerConfig::default()).unwrap()
    }

    /// Serve `response` verbatim to every connection.
    async fn serve(response: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    const OK_RESPONSE: &str =
        "HTTP/1.1 200 OK\r\ncontent-length: 15\r\nconnection: close\r\n\r\n{\"status\":\"ok\"}";

    #[tokio::test]
    async fn test_http_status_and_body_match() {
        let addr = serve(OK_RESPONSE).await;
        let mut check = HealthCheck::http("h1", "api", format!("http://{addr}/health"), 200);
        if let CheckKind::Http {
            expected_body,
            expected_body_is_regex,
            ..
        } = &mut check.kind
        {
            *expected_body = Some(r#""status":\s*"ok""#.to_string());
            *expected_body_is_regex = true;
        }

        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.status_code, Some(200));
        assert!(result.response.contains("ok"));
    }

    #[tokio::test]
    async fn test_http_status_mismatch_fails() {
        let addr = serve(OK_RESPONSE).await;
        let check = HealthCheck::http("h1", "api", format!("http://{addr}/"), 503);
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error.unwrap().contains("expected status 503"));
    }

    #[tokio::test]
    async fn test_http_body_is_capped() {
        let addr = serve(OK_RESPONSE).await;
        let config = HealthCheckerConfig {
            max_body_bytes: 4,
            ..HealthCheckerConfig::default()
        };
        let check = HealthCheck::http("h1", "api", format!("http://{addr}/"), 200);
        let result = HealthChecker::new(config)
            .unwrap()
            .execute(&check, &CancelSignal::never())
            .await;
        assert!(result.passed);
        assert_eq!(result.response, "{\"st");
        assert_eq!(result.details["truncated"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_tcp_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();
        let check = HealthCheck::tcp("t1", "open", format!("tcp://{open}"));
        assert!(checker().execute(&check, &CancelSignal::never()).await.passed);

        drop(listener);
        let check = HealthCheck::tcp("t2", "closed", open.to_string());
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_tcp_without_port_fails() {
        let check = HealthCheck::tcp("t1", "no port", "localhost");
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("has no port"));
    }

    #[tokio::test]
    async fn test_database_uses_explicit_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let check = HealthCheck::database("db", "primary", format!("postgres://app@127.0.0.1:{port}/app"));
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.details["engine"], serde_json::json!("postgres"));
    }

    #[tokio::test]
    async fn test_command_exit_status_and_output() {
        let ok = HealthCheck::command("c1", "echo", "echo ready");
        let result = checker().execute(&ok, &CancelSignal::never()).await;
        assert!(result.passed);
        assert!(result.response.contains("ready"));

        let failing = HealthCheck::command("c2", "false", "exit 3");
        let result = checker().execute(&failing, &CancelSignal::never()).await;
        assert!(!result.passed);
        assert_eq!(result.details["exit_code"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_command_expected_output_mismatch() {
        let mut check = HealthCheck::command("c1", "echo", "echo starting");
        if let CheckKind::Command {
            expected_output, ..
        } = &mut check.kind
        {
            *expected_output = Some("ready".to_string());
        }
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let check = HealthCheck::command("c1", "slow", "sleep 5").with_timeout_secs(1);
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_default_timeout_depends_on_kind() {
        let checker = checker();
        let command = HealthCheck::command("c1", "migrate", "true");
        assert_eq!(checker.timeout_for(&command), Duration::from_secs(30));

        let parsed: HealthCheck = serde_json::from_str(
            r#"{"id":"c2","name":"smoke","type":"command","command":"true"}"#,
        )
        .unwrap();
        assert_eq!(checker.timeout_for(&parsed), Duration::from_secs(30));

        let tcp = HealthCheck::tcp("t1", "port", "localhost:1");
        assert_eq!(checker.timeout_for(&tcp), Duration::from_secs(10));
        assert_eq!(
            checker.timeout_for(&command.with_timeout_secs(3)),
            Duration::from_secs(3)
        );
    }

    #[tokio::test]
    async fn test_dns_localhost_resolves() {
        let check = HealthCheck::dns("d1", "loopback", "localhost", "127.0.0.1");
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(result.passed, "{:?}", result.error);

        let wrong = HealthCheck::dns("d2", "loopback", "localhost", "10.9.9.9");
        let result = checker().execute(&wrong, &CancelSignal::never()).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_invalid_check_fails_without_attempt() {
        let check = HealthCheck::command("c1", "empty", "  ");
        let result = checker().execute(&check, &CancelSignal::never()).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("requires a command"));
    }
}
