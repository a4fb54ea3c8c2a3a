//! In-memory registry of runs
//!
//! Finished runs stay queryable until the retention period elapses.

use crate::broadcast::{RunChannel, Subscription};
use crate::protocol::{ProgressSnapshot, RunReport, ServerMessage};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::RunError;
use super::limits::RunConfig;
use super::phase::RunPhase;

struct EntryState {
    phase: RunPhase,
    report: Option<RunReport>,
    failure: Option<String>,
    finished_at: Option<Instant>,
}

/// One registered run
pub struct RunEntry {
    pub id: String,
    pub config: RunConfig,
    pub created_at: Instant,
    channel: RunChannel,
    cancel: CancellationToken,
    state: RwLock<EntryState>,
}

/// Queryable view of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub phase: RunPhase,
    pub config: RunConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub observers: usize,
}

impl RunEntry {
    pub fn phase(&self) -> RunPhase {
        self.state.read().phase
    }

    pub fn channel(&self) -> &RunChannel {
        &self.channel
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move to `next` if the lifecycle allows it
    pub fn advance(&self, next: RunPhase) -> bool {
        self.transition(next, |_| {})
    }

    /// Terminal transition that stores the report with the phase change
    pub fn complete(&self, report: RunReport) -> bool {
        self.transition(RunPhase::Completed, |state| state.report = Some(report))
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(RunPhase::Failed, |state| state.failure = Some(message))
    }

    fn transition(&self, next: RunPhase, update: impl FnOnce(&mut EntryState)) -> bool {
        let mut state = self.state.write();
        if !state.phase.can_transition_to(next) {
            warn!(
                "Run {} refused transition {:?} -> {:?}",
                self.id, state.phase, next
            );
            return false;
        }
        debug!("Run {} {:?} -> {:?}", self.id, state.phase, next);
        state.phase = next;
        if next.is_terminal() {
            state.finished_at = Some(Instant::now());
        }
        update(&mut state);
        true
    }

    pub fn summary(&self) -> RunSummary {
        let state = self.state.read();
        let progress = match self.channel.latest() {
            Some(ServerMessage::Progress(snapshot)) => Some(snapshot),
            _ => None,
        };
        RunSummary {
            run_id: self.id.clone(),
            phase: state.phase,
            config: self.config.clone(),
            progress,
            report: state.report.clone(),
            error: state.failure.clone(),
            observers: self.channel.observer_count(),
        }
    }

    fn expired(&self, retention: Duration) -> bool {
        self.state
            .read()
            .finished_at
            .is_some_and(|at| at.elapsed() > retention)
    }
}

/// All known runs, keyed by id
pub struct RunRegistry {
    runs: DashMap<String, Arc<RunEntry>>,
    retention: Duration,
}

impl RunRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            retention,
        }
    }

    /// Register a validated run; it enters the `Running` phase immediately
    pub fn insert(&self, config: RunConfig, channel_capacity: usize) -> Arc<RunEntry> {
        let id = Uuid::new_v4().to_string();
        let entry = Arc::new(RunEntry {
            id: id.clone(),
            config,
            created_at: Instant::now(),
            channel: RunChannel::new(channel_capacity),
            cancel: CancellationToken::new(),
            state: RwLock::new(EntryState {
                phase: RunPhase::Running,
                report: None,
                failure: None,
                finished_at: None,
            }),
        });
        self.runs.insert(id, entry.clone());
        counter!("loadrun_runs_started_total").increment(1);
        entry
    }

    pub fn get(&self, id: &str) -> Result<Arc<RunEntry>, RunError> {
        self.runs
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RunError::NotFound(id.to_string()))
    }

    pub fn subscribe(&self, id: &str) -> Result<Subscription, RunError> {
        Ok(self.get(id)?.channel.subscribe())
    }

    /// Request cooperative cancellation of a live run
    pub fn cancel(&self, id: &str) -> Result<(), RunError> {
        let entry = self.get(id)?;
        if entry.phase().is_terminal() {
            return Err(RunError::AlreadyFinished(id.to_string()));
        }
        info!("Cancelling run {}", id);
        entry.cancel.cancel();
        Ok(())
    }

    /// Drop finished runs older than the retention period
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .runs
            .iter()
            .filter(|e| e.value().expired(self.retention))
            .map(|e| e.key().clone())
            .collect();

        for id in &expired {
            info!("Removing expired run: {}", id);
            self.runs.remove(id);
            counter!("loadrun_runs_expired_total").increment(1);
        }
        expired.len()
    }

    /// Runs not yet completed or failed
    pub fn active_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|e| !e.value().phase().is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}
