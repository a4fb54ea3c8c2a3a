//! Run lifecycle: authorize, validate, execute, report
//!
//! `start` does the synchronous part and hands back the run id; the run
//! itself executes on a spawned task that always ends the run's channel with
//! exactly one terminal event.

use crate::analysis::build_report;
use crate::broadcast::{ProgressBroadcaster, ProgressReporter};
use crate::config::RunSettings;
use crate::orchestrator::{Orchestrator, Schedule};
use crate::probe::Probe;
use crate::protocol::{RunFailure, RunReport, RunRequest, RunStatus, ServerMessage};
use crate::scenario::ScenarioFlow;
use crate::stats::StatsAccumulator;
use futures_util::FutureExt;
use metrics::counter;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::auth::{Authorizer, Principal, authenticate};
use super::error::RunError;
use super::limits::RunConfig;
use super::phase::RunPhase;
use super::registry::{RunEntry, RunRegistry};

/// Handle to a run that passed validation
pub struct StartedRun {
    pub id: String,
    pub config: RunConfig,
    /// Resolves once the terminal event has been published
    pub handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct RunController {
    authorizer: Arc<dyn Authorizer>,
    registry: Arc<RunRegistry>,
    settings: Arc<RunSettings>,
    probe: Probe,
}

impl RunController {
    pub fn new(
        settings: RunSettings,
        authorizer: Arc<dyn Authorizer>,
        registry: Arc<RunRegistry>,
    ) -> Result<Self, reqwest::Error> {
        let probe = Probe::new(settings.probe_timeout)?;
        Ok(Self {
            authorizer,
            registry,
            settings: Arc::new(settings),
            probe,
        })
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Any valid token may observe runs
    pub async fn authorize_viewer(&self, token: Option<&str>) -> Result<Principal, RunError> {
        Ok(authenticate(self.authorizer.as_ref(), token).await?)
    }

    /// Admin only: controls runs
    pub async fn authorize_admin(&self, token: Option<&str>) -> Result<Principal, RunError> {
        let principal = authenticate(self.authorizer.as_ref(), token).await?;
        principal.require_admin()?;
        Ok(principal)
    }

    /// Authorize the caller, then parse and clamp the body, then launch.
    ///
    /// The authorizing and validating phases run here, before anything is
    /// registered; a run becomes visible in the registry at `Running`.
    pub async fn start(&self, token: Option<&str>, body: &[u8]) -> Result<StartedRun, RunError> {
        debug!("Run request {:?}", RunPhase::Authorizing);
        self.authorize_admin(token).await?;

        debug!("Run request {:?}", RunPhase::Validating);
        let request: RunRequest = serde_json::from_slice(body)
            .map_err(|e| RunError::InvalidConfig(format!("malformed run request: {}", e)))?;
        let config = self.settings.limits.apply(request)?;

        if config.clamped {
            info!(
                "Clamped run to vus={} requestsPerUser={} delayMs={} ({} mode)",
                config.vus, config.requests_per_user, config.delay_ms, config.mode.as_str()
            );
        }

        let entry = self
            .registry
            .insert(config.clone(), self.settings.progress_channel_capacity);
        info!(
            "Run {} started: scenario {} {:?}, {} vus x {} iterations against {} (~{} requests)",
            entry.id,
            config.scenario.as_str(),
            config.schedule,
            config.vus,
            config.requests_per_user,
            config.base_url,
            config.vus * config.scenario.requests_per_user(config.requests_per_user)
        );

        let id = entry.id.clone();
        let handle = tokio::spawn(drive(entry, self.settings.clone(), self.probe.clone()));

        Ok(StartedRun { id, config, handle })
    }

    /// Admin only: request cooperative cancellation
    pub async fn cancel(&self, token: Option<&str>, id: &str) -> Result<(), RunError> {
        self.authorize_admin(token).await?;
        self.registry.cancel(id)
    }
}

/// Execute a run and publish its single terminal event
async fn drive(entry: Arc<RunEntry>, settings: Arc<RunSettings>, probe: Probe) {
    let broadcaster = ProgressBroadcaster::new(entry.channel().clone());
    let outcome = guarded(execute(&entry, &settings, probe, &broadcaster)).await;
    conclude(&entry, broadcaster, outcome);
}

/// Turn a panic anywhere in the run into an `Aborted` error
async fn guarded<F>(run: F) -> Result<RunReport, RunError>
where
    F: Future<Output = Result<RunReport, RunError>>,
{
    AssertUnwindSafe(run)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(RunError::Aborted("run driver panicked".to_string())))
}

fn conclude(
    entry: &RunEntry,
    broadcaster: ProgressBroadcaster,
    outcome: Result<RunReport, RunError>,
) {
    match outcome {
        Ok(report) => {
            let status = match report.status {
                RunStatus::Passed => "passed",
                RunStatus::Failed => "failed",
            };
            info!(
                "Run {} {} after {:?}: {} requests, {} failed, p95 {:.1}ms",
                entry.id,
                status,
                entry.created_at.elapsed(),
                report.total_requests,
                report.failed,
                report.p95
            );
            counter!("loadrun_runs_completed_total", "status" => status).increment(1);
            entry.complete(report.clone());
            broadcaster.finish(ServerMessage::Done(report));
        }
        Err(e) => {
            match &e {
                RunError::Cancelled => info!("Run {} cancelled", entry.id),
                other => error!("Run {} failed: {}", entry.id, other),
            }
            counter!("loadrun_runs_completed_total", "status" => "error").increment(1);
            let message = e.to_string();
            entry.fail(message.clone());
            broadcaster.finish(ServerMessage::Error(RunFailure { message }));
        }
    }
}

async fn execute(
    entry: &RunEntry,
    settings: &RunSettings,
    probe: Probe,
    broadcaster: &ProgressBroadcaster,
) -> Result<RunReport, RunError> {
    let config = &entry.config;
    let stats = Arc::new(StatsAccumulator::new());
    let flow = ScenarioFlow::new(
        config,
        probe,
        stats.clone(),
        settings.credentials.clone(),
        entry.cancel_token().clone(),
    );
    let orchestrator = Orchestrator::new(
        flow,
        Schedule::from_kind(config.schedule, settings.waves),
        entry.cancel_token().clone(),
    );
    let reporter = ProgressReporter::new(
        &entry.id,
        config,
        &stats,
        broadcaster,
        settings.progress_every_vus,
    );

    let started = Instant::now();
    reporter.started();
    let tally = orchestrator.run(config.vus, &reporter).await?;
    if tally.login_failures > 0 {
        warn!(
            "Run {}: {} of {} users failed to log in",
            entry.id, tally.login_failures, tally.completed
        );
    }

    entry.advance(RunPhase::Aggregating);
    let elapsed = started.elapsed();
    debug!("Run {} aggregating after {:?}", entry.id, elapsed);
    Ok(build_report(
        &entry.id,
        config,
        stats.finalize(),
        elapsed,
        settings.max_error_rate,
    ))
}
