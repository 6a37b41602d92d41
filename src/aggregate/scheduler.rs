//! Fixed-interval driver for the ingestion pipeline.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::pipeline::{CycleReport, Pipeline};
use crate::config::ConfigError;
use crate::storage::FeedStore;

/// Anything the scheduler can run once per tick
pub trait CycleRunner: Send + Sync {
    fn run_cycle(&self) -> impl Future<Output = CycleReport> + Send;
}

impl<S: FeedStore> CycleRunner for Pipeline<S> {
    fn run_cycle(&self) -> impl Future<Output = CycleReport> + Send {
        Pipeline::run_cycle(self)
    }
}

/// Fires a [`Shutdown`]. Dropping it without firing also counts as shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Cancellation token observed by [`run_scheduler`] between cycles
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown is requested
    pub async fn triggered(&mut self) {
        // Err means the trigger is gone, which is a shutdown too
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

/// Totals over every cycle a scheduler ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub stored: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl SchedulerSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.stored += report.stored;
        self.duplicates += report.duplicates;
        self.failed += report.failed;
    }
}

/// Run `runner` now and then once per `interval` until `shutdown` fires.
///
/// Cycles never overlap. A cycle that outlasts the interval makes the
/// scheduler skip the missed ticks instead of replaying them. Shutdown is
/// checked before every cycle; a cycle already running is allowed to finish.
///
/// # Errors
///
/// [`ConfigError::NonPositiveInterval`] for a zero interval, before any cycle
/// runs.
pub async fn run_scheduler<R: CycleRunner>(
    runner: &R,
    interval: Duration,
    mut shutdown: Shutdown,
) -> Result<SchedulerSummary, ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::NonPositiveInterval);
    }

    tracing::info!(interval = ?interval, "Collecting feeds");

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut summary = SchedulerSummary::default();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            // The first tick completes immediately
            _ = timer.tick() => {
                let report = runner.run_cycle().await;
                summary.record(&report);
            }
        }
    }

    tracing::info!(
        cycles = summary.cycles,
        stored = summary.stored,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "Scheduler stopped"
    );
    Ok(summary)
}
