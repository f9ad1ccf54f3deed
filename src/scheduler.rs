//! Owned polling timer
//!
//! A `PollTrigger` is a tokio task that runs `Downloader::poll_once` on a
//! fixed interval or on a cron schedule until stopped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::transfer::{Downloader, PollOutcome};

#[derive(Debug, Clone)]
pub enum PollSchedule {
    /// First pass runs immediately, then once per period
    Interval(Duration),
    /// Six-field expression with seconds, e.g. `0/5 * * * * *`
    Cron(Box<Schedule>),
}

impl PollSchedule {
    pub fn cron(expr: &str) -> Result<Self, cron::error::Error> {
        Ok(PollSchedule::Cron(Box::new(Schedule::from_str(expr)?)))
    }

    /// Time until the next cron occurrence, `None` when there is none left.
    fn next_cron_delay(schedule: &Schedule) -> Option<Duration> {
        let next = schedule.upcoming(Utc).next()?;
        Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

impl fmt::Display for PollSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollSchedule::Interval(period) => write!(f, "every {}s", period.as_secs_f64()),
            PollSchedule::Cron(schedule) => write!(f, "cron '{}'", schedule),
        }
    }
}

enum Ticker {
    Interval(Interval),
    Cron(Box<Schedule>),
}

impl Ticker {
    fn new(schedule: PollSchedule) -> Self {
        match schedule {
            PollSchedule::Interval(period) => {
                let period = period.max(Duration::from_millis(1));
                let mut interval = tokio::time::interval_at(Instant::now(), period);
                // A pass that overruns swallows the ticks it covered
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticker::Interval(interval)
            }
            PollSchedule::Cron(schedule) => Ticker::Cron(schedule),
        }
    }

    /// Wait for the next firing. Returns false when the schedule is exhausted.
    async fn tick(&mut self) -> bool {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
                true
            }
            Ticker::Cron(schedule) => match PollSchedule::next_cron_delay(schedule) {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    true
                }
                None => false,
            },
        }
    }
}

/// Background task driving the downloader.
pub struct PollTrigger {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for PollTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollTrigger")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl PollTrigger {
    pub fn start(downloader: Arc<Downloader>, schedule: PollSchedule) -> Self {
        let (shutdown, mut stop_rx) = watch::channel(false);
        tracing::info!(
            remote = %downloader.settings().remote_directory,
            "Polling {}",
            schedule
        );

        let task = tokio::spawn(async move {
            let mut ticker = Ticker::new(schedule);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    more = ticker.tick() => {
                        if !more {
                            tracing::info!("Poll schedule has no further occurrences");
                            break;
                        }
                    }
                }

                // Not raced against shutdown: a started pass always completes
                match downloader.poll_once().await {
                    Ok(PollOutcome::Completed(_)) => {}
                    Ok(PollOutcome::Skipped) => {
                        tracing::debug!("Tick skipped, a pass is already running");
                    }
                    Err(e) => tracing::warn!("Poll failed: {}", e),
                }

                if *stop_rx.borrow() {
                    break;
                }
            }
            tracing::debug!("Poll trigger stopped");
        });

        Self { shutdown, task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task and wait for it, including any in-flight pass.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Poll trigger task ended abnormally: {}", e);
        }
    }
}
