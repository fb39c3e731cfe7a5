//! Shell command probe.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::domain::health::{CheckKind, HealthCheck, HealthCheckResult};

/// Run `<shell> -c <command>`. Passes on exit status zero and, when
/// `expected_output` is set, if the combined output contains it.
pub async fn probe(
    check: &HealthCheck,
    shell: &str,
    timeout: Duration,
    max_output_bytes: usize,
) -> HealthCheckResult {
    let CheckKind::Command {
        command,
        expected_output,
    } = &check.kind
    else {
        return HealthCheckResult::fail(&check.id, "not a command check");
    };

    let child = Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => {
            return HealthCheckResult::fail(&check.id, format!("failed to spawn {shell}: {e}"))
        }
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return HealthCheckResult::fail(&check.id, format!("command failed: {e}")),
        Err(_) => {
            return HealthCheckResult::fail(
                &check.id,
                format!("command timed out after {}s", timeout.as_secs()),
            )
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let truncated = combined.len() > max_output_bytes;
    if truncated {
        let mut cut = max_output_bytes;
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    let mut result = if !output.status.success() {
        HealthCheckResult::fail(&check.id, format!("command exited with status {exit_code}"))
    } else {
        match expected_output {
            Some(want) if !combined.contains(want.as_str()) => HealthCheckResult::fail(
                &check.id,
                format!("output does not contain {want:?}"),
            ),
            _ => HealthCheckResult::pass(&check.id),
        }
    };
    result.response = combined;
    result
        .with_detail("exit_code", exit_code)
        .with_detail("truncated", truncated)
}
