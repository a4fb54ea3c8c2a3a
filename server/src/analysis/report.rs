//! Assembly of the terminal run report

use crate::protocol::{RunReport, RunStatus};
use crate::run::RunConfig;
use crate::stats::FinalStats;
use std::time::Duration;

use super::bottleneck::analyze;

/// Build the report once every worker has finished.
///
/// `status` is `passed` when the aggregate error rate does not exceed
/// `max_error_rate`.
pub fn build_report(
    run_id: &str,
    config: &RunConfig,
    stats: FinalStats,
    elapsed: Duration,
    max_error_rate: f64,
) -> RunReport {
    let error_rate = stats.totals.error_rate();
    let status = if error_rate <= max_error_rate {
        RunStatus::Passed
    } else {
        RunStatus::Failed
    };
    let bottlenecks = analyze(&stats.endpoints);

    RunReport {
        run_id: run_id.to_string(),
        status,
        total_time_sec: elapsed.as_secs_f64(),
        total_requests: stats.totals.total,
        success: stats.totals.success,
        failed: stats.totals.failed,
        error_rate,
        p50: stats.p50,
        p95: stats.p95,
        p99: stats.p99,
        vus: config.vus,
        requests_per_user: config.requests_per_user,
        scenario: config.scenario,
        mode: config.mode,
        endpoints: stats.endpoints,
        bottlenecks,
        sample_errors: stats.error_samples,
    }
}
