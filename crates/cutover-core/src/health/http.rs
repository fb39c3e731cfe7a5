//! HTTP probe.

use std::time::Duration;

use regex::Regex;

use crate::domain::health::{CheckKind, HealthCheck, HealthCheckResult};

/// Single HTTP attempt. Passes when the status matches `expected_status`
/// (if set) and the body matches `expected_body` (if set).
pub async fn probe(
    client: &reqwest::Client,
    check: &HealthCheck,
    timeout: Duration,
    max_body_bytes: usize,
) -> HealthCheckResult {
    let CheckKind::Http {
        method,
        headers,
        body,
        expected_status,
        expected_body,
        expected_body_is_regex,
        ..
    } = &check.kind
    else {
        return HealthCheckResult::fail(&check.id, "not an http check");
    };

    let method = match reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            return HealthCheckResult::fail(&check.id, format!("invalid HTTP method: {method}"))
        }
    };

    let mut request = client
        .request(method.clone(), &check.endpoint)
        .timeout(timeout);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = body {
        request = request.body(body.clone());
    }

    let mut response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            let reason = if e.is_timeout() {
                format!("request timed out after {}s", timeout.as_secs())
            } else {
                format!("request failed: {e}")
            };
            return HealthCheckResult::fail(&check.id, reason)
                .with_detail("url", check.endpoint.as_str());
        }
    };

    let status = response.status().as_u16();
    let (text, truncated) = match read_capped(&mut response, max_body_bytes).await {
        Ok(read) => read,
        Err(e) => {
            let mut failed = HealthCheckResult::fail(&check.id, format!("reading body failed: {e}"));
            failed.status_code = Some(status);
            return failed;
        }
    };

    let mut problems = Vec::new();
    if let Some(expected) = expected_status {
        if *expected != status {
            problems.push(format!("expected status {expected}, got {status}"));
        }
    }
    if let Some(expected) = expected_body {
        let matched = if *expected_body_is_regex {
            match Regex::new(expected) {
                Ok(re) => re.is_match(&text),
                Err(e) => {
                    problems.push(format!("invalid body pattern: {e}"));
                    true
                }
            }
        } else {
            text.contains(expected.as_str())
        };
        if !matched {
            problems.push(format!("response body does not match {expected:?}"));
        }
    }

    let mut result = if problems.is_empty() {
        HealthCheckResult::pass(&check.id)
    } else {
        HealthCheckResult::fail(&check.id, problems.join("; "))
    };
    result.status_code = Some(status);
    result.response = text;
    result
        .with_detail("url", check.endpoint.as_str())
        .with_detail("method", method.as_str())
        .with_detail("truncated", truncated)
}

/// Read at most `limit` bytes of the body; the rest is discarded.
async fn read_capped(
    response: &mut reqwest::Response,
    limit: usize,
) -> reqwest::Result<(String, bool)> {
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = response.chunk().await? {
        let remaining = limit.saturating_sub(buf.len());
        if chunk.len() > remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}
