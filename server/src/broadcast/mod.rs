//! Per-run progress fan-out
//!
//! Each run owns one [`RunChannel`]. The run's driver publishes through a
//! [`ProgressBroadcaster`]; any number of observers subscribe through the
//! channel and receive the latest event first, then every later one.
//! Publishing never waits for observers: a slow observer lags and skips.

use crate::orchestrator::RunObserver;
use crate::protocol::{ProgressSnapshot, ServerMessage, WaveProgress};
use crate::run::RunConfig;
use crate::stats::StatsAccumulator;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

struct ChannelState {
    /// Dropped once the terminal event is out
    sender: Option<broadcast::Sender<ServerMessage>>,
    latest: Option<ServerMessage>,
}

/// Shared endpoint of a run's event stream
#[derive(Clone)]
pub struct RunChannel {
    state: Arc<RwLock<ChannelState>>,
}

/// What a new observer gets: the last event, then a live receiver.
///
/// `receiver` is `None` once the run has finished; `replay` then holds the
/// terminal event.
pub struct Subscription {
    pub replay: Option<ServerMessage>,
    pub receiver: Option<broadcast::Receiver<ServerMessage>>,
}

impl RunChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(ChannelState {
                sender: Some(sender),
                latest: None,
            })),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        // Publishing holds the write lock, so no event falls between the
        // replay and the receiver
        let state = self.state.read();
        Subscription {
            replay: state.latest.clone(),
            receiver: state.sender.as_ref().map(|s| s.subscribe()),
        }
    }

    pub fn latest(&self) -> Option<ServerMessage> {
        self.state.read().latest.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().sender.is_none()
    }

    pub fn observer_count(&self) -> usize {
        self.state
            .read()
            .sender
            .as_ref()
            .map_or(0, |s| s.receiver_count())
    }

    fn publish(&self, message: ServerMessage, terminal: bool) -> bool {
        let mut state = self.state.write();
        let Some(sender) = state.sender.as_ref() else {
            return false;
        };
        // No receivers is fine
        let _ = sender.send(message.clone());
        if terminal {
            state.sender = None;
        }
        state.latest = Some(message);
        true
    }
}

/// Write side of a run channel, held by the run's driver only
pub struct ProgressBroadcaster {
    channel: RunChannel,
}

impl ProgressBroadcaster {
    pub fn new(channel: RunChannel) -> Self {
        Self { channel }
    }

    /// Publish a progress event
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        trace!(
            "Run {} progress {:.1}%",
            snapshot.run_id, snapshot.progress_percent
        );
        self.channel
            .publish(ServerMessage::Progress(snapshot), false);
    }

    /// Publish the terminal event and close the channel.
    ///
    /// Consuming `self` makes a second terminal event unrepresentable.
    pub fn finish(self, message: ServerMessage) {
        debug_assert!(message.is_terminal());
        self.channel.publish(message, true);
    }
}

/// Turns orchestrator callbacks into throttled progress events
pub struct ProgressReporter<'a> {
    run_id: &'a str,
    config: &'a RunConfig,
    stats: &'a StatsAccumulator,
    broadcaster: &'a ProgressBroadcaster,
    every: u64,
    completed: AtomicU64,
    wave: Mutex<Option<WaveProgress>>,
}

impl<'a> ProgressReporter<'a> {
    /// `every` of 0 picks roughly 5% of the users
    pub fn new(
        run_id: &'a str,
        config: &'a RunConfig,
        stats: &'a StatsAccumulator,
        broadcaster: &'a ProgressBroadcaster,
        every: u64,
    ) -> Self {
        let every = if every == 0 {
            (config.vus / 20).max(1)
        } else {
            every
        };
        Self {
            run_id,
            config,
            stats,
            broadcaster,
            every,
            completed: AtomicU64::new(0),
            wave: Mutex::new(None),
        }
    }

    pub fn snapshot(&self, completed: u64) -> ProgressSnapshot {
        let totals = self.stats.totals();
        let progress_percent = if self.config.vus == 0 {
            100.0
        } else {
            (completed as f64 / self.config.vus as f64 * 100.0).min(100.0)
        };
        ProgressSnapshot {
            run_id: self.run_id.to_string(),
            progress_percent,
            completed_vus: completed,
            total_requests: totals.total,
            success: totals.success,
            failed: totals.failed,
            last_error: totals.last_error,
            vus: self.config.vus,
            requests_per_user: self.config.requests_per_user,
            scenario: self.config.scenario,
            mode: self.config.mode,
            wave: *self.wave.lock(),
        }
    }

    /// Publish the 0% snapshot before any user starts
    pub fn started(&self) {
        self.broadcaster.publish(self.snapshot(0));
    }
}

impl RunObserver for ProgressReporter<'_> {
    fn user_finished(&self, completed: u64) {
        self.completed.fetch_max(completed, Ordering::Relaxed);
        if completed % self.every == 0 || completed == self.config.vus {
            self.broadcaster.publish(self.snapshot(completed));
        }
    }

    fn wave_finished(&self, wave: u64, waves: u64) {
        *self.wave.lock() = Some(WaveProgress {
            index: wave,
            of: waves,
        });
        let completed = self.completed.load(Ordering::Relaxed);
        self.broadcaster.publish(self.snapshot(completed));
    }
}
