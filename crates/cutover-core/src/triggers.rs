//! Rollback trigger evaluation against a failed step.
//!
//! Pure functions: the engine builds a [`StepFailure`] from the failed
//! step, asks [`evaluate_triggers`] for a verdict, and records matches on
//! the plan's triggers with [`record_matches`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::plan::StepType;
use crate::domain::trigger::{RollbackTrigger, TriggerCondition};

/// What the engine observed about a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_type: StepType,
    pub reference_id: String,
    pub error: String,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Numeric observations (latency, error rates, ...) keyed by metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl StepFailure {
    pub fn new(step_type: StepType, reference_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_type,
            reference_id: reference_id.into(),
            error: error.into(),
            attempts: 1,
            duration_ms: 0,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMatch {
    pub trigger_id: String,
    pub priority: i32,
    pub reason: String,
}

/// Matches split by whether the trigger may roll back automatically.
/// Both lists are ordered by ascending priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerVerdict {
    pub rollback: Vec<TriggerMatch>,
    pub alerts: Vec<TriggerMatch>,
}

impl TriggerVerdict {
    pub fn should_rollback(&self) -> bool {
        !self.rollback.is_empty()
    }

    /// Reason of the highest-priority rollback match.
    pub fn reason(&self) -> Option<&str> {
        self.rollback.first().map(|m| m.reason.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rollback.is_empty() && self.alerts.is_empty()
    }
}

/// Evaluate every enabled trigger against `failure`.
pub fn evaluate_triggers(triggers: &[RollbackTrigger], failure: &StepFailure) -> TriggerVerdict {
    let mut ordered: Vec<&RollbackTrigger> = triggers.iter().filter(|t| t.enabled).collect();
    ordered.sort_by_key(|t| t.priority);

    let mut verdict = TriggerVerdict::default();
    for trigger in ordered {
        let Some(reason) = condition_matches(trigger, failure) else {
            continue;
        };
        let matched = TriggerMatch {
            trigger_id: trigger.id.clone(),
            priority: trigger.priority,
            reason,
        };
        if trigger.auto_rollback {
            verdict.rollback.push(matched);
        } else {
            verdict.alerts.push(matched);
        }
    }
    verdict
}

/// Mark every matched trigger as fired.
pub fn record_matches(triggers: &mut [RollbackTrigger], verdict: &TriggerVerdict) {
    for matched in verdict.rollback.iter().chain(verdict.alerts.iter()) {
        if let Some(trigger) = triggers.iter_mut().find(|t| t.id == matched.trigger_id) {
            trigger.fire(matched.reason.clone());
        }
    }
}

fn condition_matches(trigger: &RollbackTrigger, failure: &StepFailure) -> Option<String> {
    match &trigger.condition {
        TriggerCondition::HealthCheck {
            health_check_id,
            consecutive_failures,
        } => {
            let hit = failure.step_type == StepType::PostCheck
                && failure.reference_id == *health_check_id
                && failure.attempts >= *consecutive_failures;
            hit.then(|| {
                format!(
                    "health check {health_check_id} failed {} consecutive time(s) (threshold {consecutive_failures})",
                    failure.attempts
                )
            })
        }
        TriggerCondition::ErrorRate {
            threshold,
            unit,
            metric,
        } => {
            let observed = *failure.metrics.get(metric)?;
            (observed > *threshold).then(|| {
                format!("{metric} at {observed}{unit} exceeds error rate threshold {threshold}{unit}")
            })
        }
        TriggerCondition::Latency {
            threshold,
            unit,
            metric,
        } => {
            let observed_ms = *failure.metrics.get(metric)?;
            let threshold_ms = if unit.eq_ignore_ascii_case("s") {
                threshold * 1000.0
            } else {
                *threshold
            };
            (observed_ms > threshold_ms).then(|| {
                format!("{metric} at {observed_ms}ms exceeds latency threshold {threshold}{unit}")
            })
        }
        TriggerCondition::Timeout | TriggerCondition::Manual => None,
        TriggerCondition::Custom { expression } => match eval_expression(expression, failure) {
            Ok(true) => Some(format!("custom condition matched: {expression}")),
            Ok(false) => None,
            Err(e) => {
                warn!(trigger_id = %trigger.id, expression = %expression, error = %e, "Ignoring unparseable trigger condition");
                None
            }
        },
    }
}

/// Evaluate a custom condition.
///
/// Grammar: clauses joined by `||`, each a conjunction of atoms joined by
/// `&&`. Atoms are `any`, `error contains "text"`, or `<field> <op> <value>`
/// where field is `step_type`, `reference_id`, `error`, `attempts`,
/// `duration_ms`, or an observed metric name. A metric that was not
/// observed compares false.
pub fn eval_expression(expression: &str, failure: &StepFailure) -> Result<bool, String> {
    let mut any_clause = false;
    for clause in split_unquoted(expression, "||") {
        let mut all = true;
        for atom in split_unquoted(clause, "&&") {
            // Evaluate every atom so a malformed one is always reported.
            if !eval_atom(atom.trim(), failure)? {
                all = false;
            }
        }
        any_clause |= all;
    }
    Ok(any_clause)
}

const OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

fn eval_atom(atom: &str, failure: &StepFailure) -> Result<bool, String> {
    if atom.is_empty() {
        return Err("empty condition".to_string());
    }
    if atom == "any" || atom == "true" {
        return Ok(true);
    }
    const CONTAINS: &str = " contains ";
    if let Some(at) = find_unquoted(atom, CONTAINS) {
        let (field, needle) = (&atom[..at], &atom[at + CONTAINS.len()..]);
        if field.trim() != "error" {
            return Err(format!("`contains` only applies to error, not {:?}", field.trim()));
        }
        return Ok(failure.error.contains(unquote(needle.trim())));
    }

    // Leftmost operator outside quotes; two-character operators win ties.
    let found = OPERATORS
        .iter()
        .filter_map(|op| find_unquoted(atom, op).map(|at| (at, *op)))
        .min_by_key(|(at, _)| *at);
    match found {
        Some((at, op)) => {
            let (field, value) = (&atom[..at], &atom[at + op.len()..]);
            compare(field.trim(), op, unquote(value.trim()), failure)
        }
        None => Err(format!("unrecognised condition {atom:?}")),
    }
}

/// Byte offset of the first `pat` not inside double quotes.
fn find_unquoted(s: &str, pat: &str) -> Option<usize> {
    let mut quoted = false;
    for (at, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted && s[at..].starts_with(pat) {
            return Some(at);
        }
    }
    None
}

fn split_unquoted<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(at) = find_unquoted(rest, sep) {
        parts.push(&rest[..at]);
        rest = &rest[at + sep.len()..];
    }
    parts.push(rest);
    parts
}

fn compare(field: &str, op: &str, value: &str, failure: &StepFailure) -> Result<bool, String> {
    let text = match field {
        "step_type" => Some(failure.step_type.as_str()),
        "reference_id" => Some(failure.reference_id.as_str()),
        "error" => Some(failure.error.as_str()),
        _ => None,
    };
    if let Some(actual) = text {
        return match op {
            "==" => Ok(actual == value),
            "!=" => Ok(actual != value),
            _ => Err(format!("operator {op} not supported for {field}")),
        };
    }

    let expected: f64 = value
        .parse()
        .map_err(|_| format!("expected a number after {field} {op}, got {value:?}"))?;
    let actual = match field {
        "attempts" => f64::from(failure.attempts),
        "duration_ms" => failure.duration_ms as f64,
        metric => match failure.metrics.get(metric) {
            Some(v) => *v,
            None => return Ok(false),
        },
    };
    Ok(match op {
        ">=" => actual >= expected,
        "<=" => actual <= expected,
        ">" => actual > expected,
        "<" => actual < expected,
        "==" => actual == expected,
        _ => actual != expected,
    })
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_failure(check: &str, attempts: u32) -> StepFailure {
        StepFailure::new(StepType::PostCheck, check, "status 503").with_attempts(attempts)
    }

    fn health_trigger(id: &str, check: &str, n: u32) -> RollbackTrigger {
        RollbackTrigger::new(
            id,
            TriggerCondition::HealthCheck {
                health_check_id: check.to_string(),
                consecutive_failures: n,
            },
        )
    }

    #[test]
    fn test_health_check_trigger_needs_enough_attempts() {
        let triggers = vec![health_trigger("t1", "post-1", 3)];
        assert!(!evaluate_triggers(&triggers, &post_failure("post-1", 2)).should_rollback());
        assert!(evaluate_triggers(&triggers, &post_failure("post-1", 3)).should_rollback());
        assert!(!evaluate_triggers(&triggers, &post_failure("post-2", 9)).should_rollback());
    }

    #[test]
    fn test_disabled_and_alert_only_triggers() {
        let triggers = vec![
            health_trigger("off", "post-1", 1).disabled(),
            health_trigger("alert", "post-1", 1).alert_only(),
        ];
        let verdict = evaluate_triggers(&triggers, &post_failure("post-1", 1));
        assert!(!verdict.should_rollback());
        assert_eq!(verdict.alerts.len(), 1);
        assert_eq!(verdict.alerts[0].trigger_id, "alert");
    }

    #[test]
    fn test_matches_sorted_by_priority() {
        let triggers = vec![
            health_trigger("late", "post-1", 1).with_priority(10),
            health_trigger("early", "post-1", 1).with_priority(-1),
        ];
        let verdict = evaluate_triggers(&triggers, &post_failure("post-1", 1));
        let ids: Vec<_> = verdict.rollback.iter().map(|m| m.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(verdict.reason().unwrap().contains("post-1"));
    }

    #[test]
    fn test_timeout_and_manual_never_match() {
        let triggers = vec![
            RollbackTrigger::new("t", TriggerCondition::Timeout),
            RollbackTrigger::new("m", TriggerCondition::Manual),
        ];
        assert!(evaluate_triggers(&triggers, &post_failure("post-1", 5)).is_empty());
    }

    #[test]
    fn test_latency_threshold_units() {
        let trigger = RollbackTrigger::new(
            "lat",
            TriggerCondition::Latency {
                threshold: 2.0,
                unit: "s".to_string(),
                metric: "latency_ms".to_string(),
            },
        );
        let slow = post_failure("p", 1).with_metric("latency_ms", 2500.0);
        let fast = post_failure("p", 1).with_metric("latency_ms", 1500.0);
        assert!(evaluate_triggers(std::slice::from_ref(&trigger), &slow).should_rollback());
        assert!(!evaluate_triggers(std::slice::from_ref(&trigger), &fast).should_rollback());
        // Metric not observed.
        assert!(!evaluate_triggers(&[trigger], &post_failure("p", 1)).should_rollback());
    }

    #[test]
    fn test_error_rate_threshold() {
        let trigger = RollbackTrigger::new(
            "err",
            TriggerCondition::ErrorRate {
                threshold: 5.0,
                unit: "%".to_string(),
                metric: "error_rate".to_string(),
            },
        );
        let failure = StepFailure::new(StepType::DnsChange, "dns-1", "boom").with_metric("error_rate", 7.5);
        assert!(evaluate_triggers(&[trigger], &failure).should_rollback());
    }

    #[test]
    fn test_custom_expressions() {
        let failure = StepFailure::new(StepType::DnsChange, "dns-1", "provider returned 500")
            .with_attempts(2)
            .with_metric("error_rate", 3.0);

        assert_eq!(eval_expression("step_type == dns_change", &failure), Ok(true));
        assert_eq!(eval_expression("error contains \"500\"", &failure), Ok(true));
        assert_eq!(eval_expression("attempts >= 3", &failure), Ok(false));
        assert_eq!(
            eval_expression("attempts >= 3 || step_type == dns_change && error_rate > 2", &failure),
            Ok(true)
        );
        assert_eq!(eval_expression("missing_metric > 1", &failure), Ok(false));
        assert!(eval_expression("what is this", &failure).is_err());
        assert!(eval_expression("attempts >= many", &failure).is_err());
    }

    #[test]
    fn test_operators_inside_quotes_are_literal() {
        let failure = StepFailure::new(StepType::PostCheck, "post-1", "a>=b");
        assert_eq!(eval_expression("error == \"a>=b\"", &failure), Ok(true));
        assert_eq!(eval_expression("error != \"a<b\"", &failure), Ok(true));

        let failure = StepFailure::new(StepType::PostCheck, "post-1", "x || y && z");
        assert_eq!(
            eval_expression("error contains \"x || y && z\" && attempts >= 1", &failure),
            Ok(true)
        );
    }

    #[test]
    fn test_unparseable_custom_never_matches() {
        let trigger = RollbackTrigger::new(
            "c",
            TriggerCondition::Custom {
                expression: "rollback please".to_string(),
            },
        );
        assert!(evaluate_triggers(&[trigger], &post_failure("p", 1)).is_empty());
    }

    #[test]
    fn test_record_matches_fires_triggers() {
        let mut triggers = vec![
            health_trigger("t1", "post-1", 1),
            health_trigger("t2", "post-2", 1),
        ];
        let verdict = evaluate_triggers(&triggers, &post_failure("post-1", 1));
        record_matches(&mut triggers, &verdict);
        assert!(triggers[0].triggered);
        assert!(triggers[0].triggered_at.is_some());
        assert!(triggers[0].triggered_reason.is_some());
        assert!(!triggers[1].triggered);
    }
}
