//! Engine and health-checker configuration.
//!
//! Both structs carry sensible defaults and can be overridden from the
//! environment via `from_env()`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Orchestration engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Plan-wide timeout when neither the options nor the plan set one.
    pub default_timeout_secs: u64,
    /// Simulated per-step delay in dry-run mode.
    pub dry_run_step_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30 * 60,
            dry_run_step_delay_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `CUTOVER_DEFAULT_TIMEOUT_SECS` and
    /// `CUTOVER_DRY_RUN_DELAY_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_timeout_secs: env_u64("CUTOVER_DEFAULT_TIMEOUT_SECS")
                .unwrap_or(defaults.default_timeout_secs),
            dry_run_step_delay_ms: env_u64("CUTOVER_DRY_RUN_DELAY_MS")
                .unwrap_or(defaults.dry_run_step_delay_ms),
        }
    }

    pub fn with_dry_run_delay_ms(mut self, delay_ms: u64) -> Self {
        self.dry_run_step_delay_ms = delay_ms;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn dry_run_delay(&self) -> Duration {
        Duration::from_millis(self.dry_run_step_delay_ms)
    }
}

/// Health checker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckerConfig {
    pub user_agent: String,
    /// Response bodies are truncated to this many bytes.
    pub max_body_bytes: usize,
    pub default_tcp_timeout_secs: u64,
    pub default_command_timeout_secs: u64,
    /// Shell used for command checks (invoked as `<shell> -c <command>`).
    pub shell: String,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("cutover-health/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: 1024 * 1024,
            default_tcp_timeout_secs: 10,
            default_command_timeout_secs: 30,
            shell: "sh".to_string(),
        }
    }
}

impl HealthCheckerConfig {
    /// Defaults overridden by `CUTOVER_HTTP_USER_AGENT` and `CUTOVER_SHELL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: std::env::var("CUTOVER_HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
            shell: std::env::var("CUTOVER_SHELL").unwrap_or(defaults.shell),
            ..defaults
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
