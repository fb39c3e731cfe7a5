//! Operator instructions for manual-mode cutovers.

use std::fmt::Write;

use cutover_dns::{render_apply_steps, render_rollback_steps};

use crate::domain::health::{CheckKind, HealthCheck};
use crate::domain::plan::CutoverPlan;

/// Render the complete ordered runbook for `plan`: pre-flight checks, DNS
/// changes, the propagation wait, post-flight checks, and rollback.
pub fn render_manual_instructions(plan: &CutoverPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CUTOVER PLAN: {} ({})", plan.name, plan.id);
    if !plan.bundle_id.is_empty() {
        let _ = writeln!(out, "Bundle: {}", plan.bundle_id);
    }
    out.push('\n');

    out.push_str("PRE-FLIGHT CHECKS\n");
    render_checks(&mut out, &plan.pre_checks);
    out.push('\n');

    out.push_str("DNS CHANGES\n");
    if plan.dns_changes.is_empty() {
        out.push_str("  (none)\n");
    } else {
        out.push_str(&render_apply_steps(&plan.dns_changes));
    }
    out.push('\n');

    out.push_str("WAIT FOR DNS PROPAGATION\n");
    if plan.dns_propagation_wait_secs > 0 {
        let _ = writeln!(
            out,
            "  Wait {} seconds for the changes to propagate before continuing.",
            plan.dns_propagation_wait_secs
        );
    } else {
        out.push_str("  Confirm the new records resolve before continuing.\n");
    }
    out.push('\n');

    out.push_str("POST-FLIGHT CHECKS\n");
    render_checks(&mut out, &plan.post_checks);
    out.push('\n');

    out.push_str("ROLLBACK INSTRUCTIONS\n");
    if plan.dns_changes.is_empty() {
        out.push_str("  Nothing to roll back.\n");
    } else {
        out.push_str("  If a critical post-flight check fails, revert in this order:\n");
        out.push_str(&render_rollback_steps(&plan.dns_changes));
    }
    out
}

fn render_checks(out: &mut String, checks: &[HealthCheck]) {
    if checks.is_empty() {
        out.push_str("  (none)\n");
        return;
    }
    for (i, check) in checks.iter().enumerate() {
        let mut flags = Vec::new();
        if !check.critical {
            flags.push("non-critical");
        }
        if !check.enabled {
            flags.push("disabled, skip");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        let _ = writeln!(out, "  {}. {}{}", i + 1, check.describe(), suffix);
        let _ = writeln!(out, "     Expect: {}", expectation(check));
    }
}

fn expectation(check: &HealthCheck) -> String {
    match &check.kind {
        CheckKind::Http {
            method,
            expected_status,
            expected_body,
            ..
        } => {
            let mut parts = vec![format!("{method} request")];
            if let Some(status) = expected_status {
                parts.push(format!("returns status {status}"));
            }
            if let Some(body) = expected_body {
                parts.push(format!("body matches {body:?}"));
            }
            parts.join(", ")
        }
        CheckKind::Tcp => "port accepts TCP connections".to_string(),
        CheckKind::Dns { expected_value } => match expected_value {
            Some(value) => format!("resolves to {value}"),
            None => "resolves".to_string(),
        },
        CheckKind::Database { .. } => "database port accepts connections".to_string(),
        CheckKind::Command {
            expected_output, ..
        } => match expected_output {
            Some(output) => format!("exits 0 with output containing {output:?}"),
            None => "exits 0".to_string(),
        },
    }
}
