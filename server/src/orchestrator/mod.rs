//! Virtual user scheduling
//!
//! Burst starts every user at once. Waves start users in fixed-size groups,
//! waiting for a whole group to finish (plus a pause) before the next one.

use crate::protocol::ScheduleKind;
use crate::run::RunError;
use crate::scenario::FlowOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One virtual user's journey, run once per user index
#[async_trait]
pub trait VirtualUser: Send + Sync {
    async fn run(&self, vu_index: u64) -> FlowOutcome;
}

/// Receives completion events while a run is in flight
pub trait RunObserver: Send + Sync {
    /// Called once per finished virtual user with the running total
    fn user_finished(&self, completed: u64);

    /// Called after every user of wave `wave` (1-based) finished
    fn wave_finished(&self, wave: u64, waves: u64);
}

/// Wave sizing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveConfig {
    /// Nominal spacing between wave starts, used to size the waves
    pub interval: Duration,
    /// Upper bound on users in one wave
    pub concurrency_cap: u64,
    /// Sleep between the end of one wave and the start of the next
    pub pause: Duration,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            concurrency_cap: 100,
            pause: Duration::from_millis(1000),
        }
    }
}

impl WaveConfig {
    /// Users started together: `vus` spread over one minute of waves, capped
    pub fn users_per_wave(&self, vus: u64) -> u64 {
        let waves_per_minute = 60u64
            .checked_div(self.interval.as_secs())
            .unwrap_or(1)
            .max(1);
        vus.div_ceil(waves_per_minute)
            .min(self.concurrency_cap)
            .max(1)
    }

    pub fn wave_count(&self, vus: u64) -> u64 {
        vus.div_ceil(self.users_per_wave(vus))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Burst,
    Waves(WaveConfig),
}

impl Schedule {
    pub fn from_kind(kind: ScheduleKind, waves: WaveConfig) -> Self {
        match kind {
            ScheduleKind::Burst => Schedule::Burst,
            ScheduleKind::Waves => Schedule::Waves(waves),
        }
    }
}

/// Tally of finished users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserTally {
    pub completed: u64,
    pub login_failures: u64,
}

/// Drives `vus` copies of one scenario flow
pub struct Orchestrator {
    user: Arc<dyn VirtualUser>,
    schedule: Schedule,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        user: impl VirtualUser + 'static,
        schedule: Schedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            user: Arc::new(user),
            schedule,
            cancel,
        }
    }

    /// Run every user to completion.
    ///
    /// Returns `Cancelled` when the token fired before all users were started
    /// or finished, and `Aborted` when a worker panicked.
    pub async fn run(&self, vus: u64, observer: &dyn RunObserver) -> Result<UserTally, RunError> {
        let mut tally = UserTally::default();

        match self.schedule {
            Schedule::Burst => {
                info!("Starting {} virtual users in burst", vus);
                let mut workers = self.spawn_users(0..vus);
                self.drain(&mut workers, &mut tally, observer).await?;
            }
            Schedule::Waves(waves) => {
                let size = waves.users_per_wave(vus);
                let count = waves.wave_count(vus);
                info!(
                    "Starting {} virtual users in {} waves of up to {}",
                    vus, count, size
                );

                for wave in 0..count {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let start = wave * size;
                    let end = (start + size).min(vus);
                    debug!("Wave {}/{}: users {}..{}", wave + 1, count, start, end);

                    let mut workers = self.spawn_users(start..end);
                    self.drain(&mut workers, &mut tally, observer).await?;
                    observer.wave_finished(wave + 1, count);

                    if wave + 1 < count {
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(waves.pause) => {}
                        }
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        Ok(tally)
    }

    fn spawn_users(&self, range: std::ops::Range<u64>) -> JoinSet<FlowOutcome> {
        let mut workers = JoinSet::new();
        for vu in range {
            let user = self.user.clone();
            workers.spawn(async move { user.run(vu).await });
        }
        workers
    }

    async fn drain(
        &self,
        workers: &mut JoinSet<FlowOutcome>,
        tally: &mut UserTally,
        observer: &dyn RunObserver,
    ) -> Result<(), RunError> {
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome == FlowOutcome::LoginFailed {
                        tally.login_failures += 1;
                    }
                    tally.completed += 1;
                    observer.user_finished(tally.completed);
                }
                Err(e) => {
                    error!("Virtual user task failed: {}", e);
                    workers.abort_all();
                    self.cancel.cancel();
                    let message = format!("virtual user task failed: {}", e);
                    return Err(RunError::Aborted(message));
                }
            }
        }
        Ok(())
    }
}
