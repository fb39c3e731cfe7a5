//! Health checker integration tests against local sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cutover_core::{
    cancel_pair, CancelSignal, CutoverEngine, CutoverPlan, EngineConfig, ExecuteOptions,
    HealthCheck, HealthChecker, HealthCheckerConfig, HealthProbe, PlanStatus,
};
use cutover_dns::fakes::RecordingProvider;
use cutover_dns::{DnsChange, ProviderRegistry, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";
const UNAVAILABLE: &str =
    "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\ndown";

fn checker() -> HealthChecker {
    HealthChecker::new(HealthCheckerConfig::default()).unwrap()
}

/// Answer the first `failures` requests with 503, the rest with 200.
async fn flaky_server(failures: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let response = if n < failures { UNAVAILABLE } else { OK };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, hits)
}

async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn closed_port_is_attempted_retries_plus_one_times() {
    let addr = closed_port().await;
    let check = HealthCheck::tcp("tcp", "closed", addr.to_string()).with_retries(2, 10);

    let result = checker().execute(&check, &CancelSignal::never()).await;

    assert!(!result.passed);
    assert_eq!(result.attempts, 3);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn http_check_recovers_within_retries() {
    let (addr, hits) = flaky_server(2).await;
    let check =
        HealthCheck::http("http", "flaky", format!("http://{addr}/"), 200).with_retries(3, 10);

    let result = checker().execute(&check, &CancelSignal::never()).await;

    assert!(result.passed, "{:?}", result.error);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn http_check_exhausts_retries() {
    let (addr, hits) = flaky_server(usize::MAX).await;
    let check =
        HealthCheck::http("http", "down", format!("http://{addr}/"), 200).with_retries(1, 10);

    let result = checker().execute(&check, &CancelSignal::never()).await;

    assert!(!result.passed);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.status_code, Some(503));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deadline_interrupts_retry_delay() {
    let addr = closed_port().await;
    let check = HealthCheck::tcp("tcp", "closed", addr.to_string()).with_retries(100, 60_000);
    let (_handle, signal) = cancel_pair(Some(Duration::from_millis(200)));

    let started = std::time::Instant::now();
    let result = checker().execute(&check, &signal).await;

    assert!(!result.passed);
    assert!(result.attempts < 101);
    assert_eq!(result.error.as_deref(), Some("cutover timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn command_check_runs_through_shell() {
    let check = HealthCheck::command("cmd", "echo", "printf ready");
    let result = checker().execute(&check, &CancelSignal::never()).await;
    assert!(result.passed, "{:?}", result.error);
    assert!(result.response.contains("ready"));
}

#[tokio::test]
async fn engine_rolls_back_when_live_post_check_fails() {
    let (healthy, _) = flaky_server(0).await;
    let (broken, _) = flaky_server(usize::MAX).await;

    let provider = Arc::new(RecordingProvider::new("fake"));
    let mut registry = ProviderRegistry::with_manual();
    registry.register(provider.clone());
    let engine = CutoverEngine::with_health_checker(
        registry,
        EngineConfig::default(),
        HealthCheckerConfig::default(),
    )
    .unwrap();

    let mut plan = CutoverPlan::with_id("live", "bundle", "live checks");
    plan.add_pre_check(HealthCheck::tcp("pre", "target listening", healthy.to_string()))
        .add_dns_change(
            DnsChange::new("d1", "example.com", RecordType::A, "api", "10.0.0.1", "10.0.0.2")
                .with_provider("fake"),
        )
        .add_post_check(HealthCheck::http(
            "post",
            "api healthy",
            format!("http://{broken}/health"),
            200,
        ));

    let result = engine
        .execute(plan, ExecuteOptions::default())
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(result.status, PlanStatus::RolledBack);
    assert_eq!(provider.write_calls().len(), 2);
}
