//! Health check model: one readiness/liveness probe and its outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{CutoverError, Result};

/// Protocol-specific probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    Http {
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        expected_status: Option<u16>,
        #[serde(default)]
        expected_body: Option<String>,
        #[serde(default)]
        expected_body_is_regex: bool,
        #[serde(default)]
        skip_tls_verify: bool,
    },
    Tcp,
    Dns {
        #[serde(default)]
        expected_value: Option<String>,
    },
    Database {
        #[serde(default)]
        query: Option<String>,
    },
    Command {
        command: String,
        #[serde(default)]
        expected_output: Option<String>,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

impl CheckKind {
    /// Wire name of the kind (`http`, `tcp`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Http { .. } => "http",
            CheckKind::Tcp => "tcp",
            CheckKind::Dns { .. } => "dns",
            CheckKind::Database { .. } => "database",
            CheckKind::Command { .. } => "command",
        }
    }
}

/// A single probe against a target endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    /// URL, `host:port`, hostname, or connection string depending on kind.
    #[serde(default)]
    pub endpoint: String,
    /// Per-attempt timeout; unset means the checker's default for the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Whether a failure aborts (pre-check) or rolls back (post-check) the plan.
    #[serde(default = "default_true")]
    pub critical: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl HealthCheck {
    fn with_kind(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        kind: CheckKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            endpoint: endpoint.into(),
            timeout_secs: None,
            retries: 0,
            retry_delay_ms: 0,
            critical: true,
            enabled: true,
        }
    }

    /// HTTP GET check expecting `expected_status`.
    pub fn http(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        expected_status: u16,
    ) -> Self {
        Self::with_kind(
            id,
            name,
            url,
            CheckKind::Http {
                method: default_method(),
                headers: BTreeMap::new(),
                body: None,
                expected_status: Some(expected_status),
                expected_body: None,
                expected_body_is_regex: false,
                skip_tls_verify: false,
            },
        )
    }

    pub fn tcp(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self::with_kind(id, name, address, CheckKind::Tcp)
    }

    pub fn dns(
        id: impl Into<String>,
        name: impl Into<String>,
        hostname: impl Into<String>,
        expected_value: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            id,
            name,
            hostname,
            CheckKind::Dns {
                expected_value: Some(expected_value.into()),
            },
        )
    }

    pub fn database(
        id: impl Into<String>,
        name: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self::with_kind(id, name, connection, CheckKind::Database { query: None })
    }

    pub fn command(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            id,
            name,
            "",
            CheckKind::Command {
                command: command.into(),
                expected_output: None,
            },
        )
    }

    pub fn with_retries(mut self, retries: u32, retry_delay_ms: u64) -> Self {
        self.retries = retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Explicit per-attempt timeout, if one was configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total attempts allowed (`retries + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Short human description, e.g. `[http] API health -> https://...`.
    pub fn describe(&self) -> String {
        let target = match &self.kind {
            CheckKind::Command { command, .. } => command.as_str(),
            _ => self.endpoint.as_str(),
        };
        format!("[{}] {} -> {}", self.kind.name(), self.name, target)
    }

    /// Structural validation.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CutoverError::InvalidHealthCheck {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid("timeout must be positive"));
        }

        match &self.kind {
            CheckKind::Http {
                expected_status,
                expected_body,
                expected_body_is_regex,
                ..
            } => {
                if self.endpoint.trim().is_empty() {
                    return Err(invalid("http check requires an endpoint"));
                }
                if expected_status.is_none() && expected_body.is_none() {
                    return Err(invalid(
                        "http check requires an expected status or an expected body",
                    ));
                }
                if let (Some(pattern), true) = (expected_body, *expected_body_is_regex) {
                    regex::Regex::new(pattern).map_err(|e| CutoverError::InvalidHealthCheck {
                        id: self.id.clone(),
                        reason: format!("expected body regex does not compile: {e}"),
                    })?;
                }
            }
            CheckKind::Tcp | CheckKind::Database { .. } => {
                if self.endpoint.trim().is_empty() {
                    return Err(invalid("check requires an endpoint"));
                }
            }
            CheckKind::Dns { expected_value } => {
                if self.endpoint.trim().is_empty() {
                    return Err(invalid("dns check requires a hostname"));
                }
                if expected_value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    return Err(invalid("dns check requires an expected value"));
                }
            }
            CheckKind::Command { command, .. } => {
                if command.trim().is_empty() {
                    return Err(invalid("command check requires a command"));
                }
            }
        }
        Ok(())
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    pub check_id: String,
    pub passed: bool,
    pub status_code: Option<u16>,
    /// Captured response body or command output.
    pub response: String,
    pub duration_ms: u64,
    /// Attempt at which execution stopped (1-based).
    pub attempts: u32,
    pub error: Option<String>,
    pub details: BTreeMap<String, serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn pass(check_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            passed: true,
            status_code: None,
            response: String::new(),
            duration_ms: 0,
            attempts: 1,
            error: None,
            details: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn fail(check_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            ..Self::pass(check_id)
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// One-line summary for step output and logs.
    pub fn summary(&self) -> String {
        let verdict = if self.passed { "passed" } else { "failed" };
        let mut line = format!(
            "check {} {} after {} attempt(s) in {}ms",
            self.check_id, verdict, self.attempts, self.duration_ms
        );
        if let Some(code) = self.status_code {
            line.push_str(&format!(" (status {code})"));
        }
        if let Some(err) = &self.error {
            line.push_str(&format!(": {err}"));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_requires_expectation() {
        let mut check = HealthCheck::http("h1", "api", "https://example.com/health", 200);
        assert!(check.validate().is_ok());

        if let CheckKind::Http {
            expected_status, ..
        } = &mut check.kind
        {
            *expected_status = None;
        }
        let err = check.validate().unwrap_err();
        assert!(err.to_string().contains("expected status or an expected body"));
    }

    #[test]
    fn test_http_regex_must_compile() {
        let mut check = HealthCheck::http("h1", "api", "https://example.com", 200);
        if let CheckKind::Http {
            expected_body,
            expected_body_is_regex,
            ..
        } = &mut check.kind
        {
            *expected_body = Some("status: (ok".to_string());
            *expected_body_is_regex = true;
        }
        assert!(check.validate().is_err());
    }

    #[test]
    fn test_dns_requires_expected_value() {
        let check = HealthCheck::dns("d1", "dns", "example.com", "");
        assert!(check.validate().is_err());
        assert!(HealthCheck::dns("d1", "dns", "example.com", "2.2.2.2")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let check = HealthCheck::tcp("t1", "db port", "db:5432").with_timeout_secs(0);
        assert!(check.validate().is_err());
    }

    #[test]
    fn test_timeout_unset_by_default() {
        let check = HealthCheck::command("c1", "migrate", "true");
        assert_eq!(check.timeout(), None);
        assert!(check.validate().is_ok());
        let check = check.with_timeout_secs(5);
        assert_eq!(check.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_max_attempts() {
        let check = HealthCheck::tcp("t1", "tcp", "localhost:1").with_retries(3, 10);
        assert_eq!(check.max_attempts(), 4);
        assert_eq!(check.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_deserialize_tagged_kind() {
        let check: HealthCheck = serde_json::from_str(
            r#"{"id":"h","name":"api","type":"http","endpoint":"http://x","expected_status":200}"#,
        )
        .unwrap();
        assert!(matches!(
            check.kind,
            CheckKind::Http {
                expected_status: Some(200),
                ..
            }
        ));
        assert!(check.critical);
        assert!(check.enabled);
        assert_eq!(check.timeout_secs, None);

        let unknown = serde_json::from_str::<HealthCheck>(
            r#"{"id":"h","name":"x","type":"ftp","endpoint":"ftp://x"}"#,
        );
        assert!(unknown.is_err());
    }

    #[test]
    fn test_result_summary() {
        let result = HealthCheckResult::fail("h1", "connection refused");
        let summary = result.summary();
        assert!(summary.contains("failed"));
        assert!(summary.contains("connection refused"));
    }
}
