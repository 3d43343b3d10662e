//! Interval scheduler for background jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A periodic background task.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Period between passes.
    fn interval(&self) -> Duration;

    /// Run immediately at startup instead of waiting one interval first.
    fn run_at_startup(&self) -> bool {
        false
    }

    /// Run one pass. Returns how many records the pass touched.
    async fn execute(&self) -> Result<usize, String>;
}

/// Run a single pass of `job`, logging and recording its outcome.
pub async fn run_once(job: &dyn Job) -> Result<usize, String> {
    let name = job.name();
    let start = Instant::now();
    let result = job.execute().await;
    let elapsed = start.elapsed();

    histogram!("background_job_duration_seconds", "job" => name).record(elapsed.as_secs_f64());

    match &result {
        Ok(0) => {
            counter!("background_job_runs_total", "job" => name, "outcome" => "idle").increment(1);
            debug!(job = name, elapsed_ms = elapsed.as_millis(), "Job found nothing to do");
        }
        Ok(processed) => {
            counter!("background_job_runs_total", "job" => name, "outcome" => "ok").increment(1);
            info!(
                job = name,
                processed,
                elapsed_ms = elapsed.as_millis(),
                "Job completed"
            );
        }
        Err(e) => {
            counter!("background_job_runs_total", "job" => name, "outcome" => "error").increment(1);
            error!(job = name, elapsed_ms = elapsed.as_millis(), error = %e, "Job failed");
        }
    }

    result
}

/// Spawns one task per registered job and stops them together.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn start(&mut self) {
        info!(jobs = self.jobs.len(), "Starting job scheduler");

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            self.handles.push(tokio::spawn(async move {
                let name = job.name();
                let mut ticker = tokio::time::interval(job.interval());
                // Missed ticks are delayed, never replayed in a burst.
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                // The first tick completes immediately.
                ticker.tick().await;
                if job.run_at_startup() {
                    let _ = run_once(job.as_ref()).await;
                }

                info!(job = name, interval_ms = job.interval().as_millis(), "Job scheduled");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let _ = run_once(job.as_ref()).await;
                        }
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!(job = name, "Job shutting down");
                                break;
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Signal every job to stop after its current pass.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every job task to exit, up to `timeout`.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let handles = self.handles;
        let drain = async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => info!("All jobs stopped"),
            Err(_) => warn!(timeout_ms = timeout.as_millis(), "Job shutdown timed out"),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
