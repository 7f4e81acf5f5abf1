use crate::domain::ports::{Scheduler, TimerCallback};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

struct Job {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Job {
    /// No further ticks. A callback already running is left to finish.
    fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Runs each registered callback on its own tokio interval task.
///
/// Ticks that fall behind are skipped, and one callback never overlaps itself
/// because the task awaits it before the next tick. Stopping a job only
/// interrupts the wait between ticks, never a running callback.
#[derive(Default)]
pub struct IntervalScheduler {
    jobs: Mutex<HashMap<String, Job>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops every job and waits for callbacks that are mid-run.
    pub async fn shutdown(&self) {
        let jobs: Vec<(String, Job)> = self.jobs.lock().await.drain().collect();
        for (_, job) in &jobs {
            job.signal_stop();
        }
        for (id, job) in jobs {
            if let Err(e) = job.handle.await {
                warn!("IntervalScheduler: Job '{}' ended abnormally: {}", id, e);
            }
            info!("IntervalScheduler: Stopped job '{}'", id);
        }
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn register(
        &self,
        id: &str,
        interval: Duration,
        callback: TimerCallback,
        replace_existing: bool,
    ) -> Result<()> {
        if interval.is_zero() {
            anyhow::bail!("Interval for job '{}' must be non-zero", id);
        }

        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.get(id) {
            if !replace_existing {
                anyhow::bail!("Job '{}' is already registered", id);
            }
            existing.signal_stop();
            warn!("IntervalScheduler: Replacing job '{}'", id);
        }

        let job_id = id.to_string();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately; wait one full period before running
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }
                callback().await;
            }
        });

        jobs.insert(job_id, Job { stop_tx, handle });
        info!(
            "IntervalScheduler: Registered job '{}' every {:?}",
            id, interval
        );
        Ok(())
    }

    async fn cancel(&self, id: &str) -> bool {
        match self.jobs.lock().await.remove(id) {
            Some(job) => {
                job.signal_stop();
                true
            }
            None => false,
        }
    }

    async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
