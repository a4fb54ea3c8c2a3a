//! Threshold rules that flag slow or failing endpoints

use crate::protocol::{BottleneckFinding, EndpointSummary, FindingRule, Severity};

/// Error rate above which an endpoint is flagged
pub const ERROR_RATE_HIGH: f64 = 0.01;
/// Error rate above which a flag becomes critical
pub const ERROR_RATE_CRITICAL: f64 = 0.05;
/// p95 latency (ms) above which an endpoint is flagged
pub const P95_HIGH_MS: f64 = 2000.0;
/// p95 latency (ms) above which a flag becomes critical
pub const P95_CRITICAL_MS: f64 = 3000.0;

const ERROR_RATE_RECOMMENDATION: &str = "Check rate limiting, upstream timeouts and connection pool exhaustion; inspect the sampled error bodies for the failing status codes.";
const ERROR_RATE_IMPACT: &str =
    "Users hitting this endpoint see failed actions; retries add further load.";
const LATENCY_IMPACT: &str =
    "One request in twenty waits over two seconds; perceived responsiveness degrades.";
const LATENCY_RECOMMENDATION: &str = "Review database query plans, add indexes or caching for hot reads, and profile the handler under concurrent load.";

/// Apply both rules to every endpoint. Zero, one or two findings per endpoint.
pub fn analyze(endpoints: &[EndpointSummary]) -> Vec<BottleneckFinding> {
    let mut findings = Vec::new();

    for endpoint in endpoints {
        if endpoint.error_rate > ERROR_RATE_HIGH {
            let severity = if endpoint.error_rate > ERROR_RATE_CRITICAL {
                Severity::Critical
            } else {
                Severity::High
            };
            findings.push(BottleneckFinding {
                component: endpoint.name.clone(),
                rule: FindingRule::ErrorRate,
                severity,
                description: format!(
                    "{} failed {} of {} requests ({:.2}% error rate)",
                    endpoint.name, endpoint.failed, endpoint.total, endpoint.error_rate * 100.0
                ),
                impact: ERROR_RATE_IMPACT.to_string(),
                recommendation: ERROR_RATE_RECOMMENDATION.to_string(),
            });
        }

        if endpoint.p95_latency_ms > P95_HIGH_MS {
            let severity = if endpoint.p95_latency_ms > P95_CRITICAL_MS {
                Severity::Critical
            } else {
                Severity::High
            };
            findings.push(BottleneckFinding {
                component: endpoint.name.clone(),
                rule: FindingRule::Latency,
                severity,
                description: format!(
                    "{} p95 latency is {:.0}ms (mean {:.0}ms)",
                    endpoint.name, endpoint.p95_latency_ms, endpoint.mean_latency_ms
                ),
                impact: LATENCY_IMPACT.to_string(),
                recommendation: LATENCY_RECOMMENDATION.to_string(),
            });
        }
    }

    findings
}
