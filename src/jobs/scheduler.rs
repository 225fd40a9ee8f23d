//! Fixed-interval job scheduler
//!
//! One tokio task per job drives a `tokio::time::interval`. Each tick spawns
//! the run so a slow job cannot delay the ticker; an in-flight flag makes any
//! tick that lands while the previous run is still going count as skipped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::Job;
use crate::coordination::ShutdownToken;
use crate::error::GorillionaireError;

/// Per-job counters exposed by `/api/system/jobs`
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub name: String,
    pub interval_secs: u64,
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// Shared, cloneable view of every job's stats
#[derive(Clone, Default)]
pub struct SchedulerStats {
    jobs: Arc<DashMap<&'static str, JobStats>>,
}

impl SchedulerStats {
    /// All jobs, sorted by name
    pub fn snapshot(&self) -> Vec<JobStats> {
        let mut all: Vec<JobStats> = self.jobs.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn get(&self, name: &str) -> Option<JobStats> {
        self.jobs.get(name).map(|e| e.value().clone())
    }

    fn update(&self, name: &'static str, f: impl FnOnce(&mut JobStats)) {
        if let Some(mut entry) = self.jobs.get_mut(name) {
            f(entry.value_mut());
        }
    }
}

pub struct JobScheduler {
    job_timeout: Duration,
    jobs: Vec<Arc<dyn Job>>,
    stats: SchedulerStats,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new(job_timeout: Duration) -> Self {
        Self {
            job_timeout,
            jobs: Vec::new(),
            stats: SchedulerStats::default(),
            handles: Vec::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>) -> &mut Self {
        self.stats.jobs.insert(
            job.name(),
            JobStats {
                name: job.name().to_string(),
                interval_secs: job.interval().as_secs(),
                ..JobStats::default()
            },
        );
        self.jobs.push(job);
        self
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one ticker per registered job. The first run starts immediately.
    pub fn start(&mut self, shutdown: ShutdownToken) {
        for job in &self.jobs {
            info!(
                "Starting job {} every {:?} (timeout {:?})",
                job.name(),
                job.interval(),
                self.job_timeout
            );
            self.handles.push(tokio::spawn(run_loop(
                job.clone(),
                self.job_timeout,
                self.stats.clone(),
                shutdown.clone(),
            )));
        }
    }

    /// Wait for every ticker to exit (after shutdown), including in-flight runs
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Job ticker task failed: {}", e);
            }
        }
        info!("Job scheduler stopped");
    }
}

async fn run_loop(
    job: Arc<dyn Job>,
    timeout: Duration,
    stats: SchedulerStats,
    mut shutdown: ShutdownToken,
) {
    let name = job.name();
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut interval = tokio::time::interval(job.interval().max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            _ = interval.tick() => {
                if in_flight.swap(true, Ordering::SeqCst) {
                    stats.update(name, |s| s.skipped += 1);
                    debug!(job = name, "Previous run still in flight, skipping tick");
                    continue;
                }
                current = Some(tokio::spawn(execute(
                    job.clone(),
                    timeout,
                    stats.clone(),
                    in_flight.clone(),
                )));
            }
        }
    }

    if let Some(handle) = current {
        if !handle.is_finished() {
            info!(job = name, "Waiting for in-flight run before stopping");
        }
        let _ = handle.await;
    }
    debug!(job = name, "Job ticker stopped");
}

async fn execute(
    job: Arc<dyn Job>,
    timeout: Duration,
    stats: SchedulerStats,
    in_flight: Arc<AtomicBool>,
) {
    let name = job.name();
    let started = Instant::now();
    stats.update(name, |s| {
        s.runs += 1;
        s.running = true;
        s.last_started = Some(Utc::now());
    });

    let result = match tokio::time::timeout(timeout, AssertUnwindSafe(job.run()).catch_unwind())
        .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(GorillionaireError::Internal(format!("job {} panicked", name))),
        Err(_) => Err(GorillionaireError::Timeout {
            operation: format!("job {}", name),
            elapsed_ms: timeout.as_millis() as u64,
        }),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => debug!(job = name, elapsed_ms, "Job run completed"),
        Err(e) => warn!(job = name, elapsed_ms, "Job run failed: {}", e),
    }

    stats.update(name, |s| {
        s.running = false;
        s.last_finished = Some(Utc::now());
        s.last_duration_ms = Some(elapsed_ms);
        match result {
            Ok(()) => s.last_error = None,
            Err(e) => {
                s.failures += 1;
                s.last_error = Some(e.to_string());
            }
        }
    });
    in_flight.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{GracefulShutdown, ShutdownSignal};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct SlowJob {
        interval: Duration,
        work: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowJob {
        fn new(interval_secs: u64, work_secs: u64) -> Arc<Self> {
            Arc::new(Self {
                interval: Duration::from_secs(interval_secs),
                work: Duration::from_secs(work_secs),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Job for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        async fn run(&self) -> Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingJob;

    #[async_trait]
    impl Job for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run(&self) -> Result<()> {
            Err(GorillionaireError::upstream("blockchain", "503"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_never_overlaps_and_counts_skipped_ticks() {
        let shutdown = GracefulShutdown::with_defaults();
        let job = SlowJob::new(60, 150);
        let mut scheduler = JobScheduler::new(Duration::from_secs(1000));
        scheduler.register(job.clone());
        scheduler.start(shutdown.token());

        // t=0 run starts, t=60/120 skipped, t=150 run ends, t=180 second run
        tokio::time::sleep(Duration::from_secs(200)).await;

        let stats = scheduler.stats().get("slow").unwrap();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.failures, 0);
        assert!(stats.running);
        assert_eq!(job.max_active.load(Ordering::SeqCst), 1);

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        scheduler.join().await;
        assert!(!scheduler.stats().get("slow").unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let shutdown = GracefulShutdown::with_defaults();
        let mut scheduler = JobScheduler::new(Duration::from_secs(5));
        scheduler.register(SlowJob::new(60, 3600));
        scheduler.start(shutdown.token());

        tokio::time::sleep(Duration::from_secs(10)).await;

        let stats = scheduler.stats().get("slow").unwrap();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.failures, 1);
        assert!(!stats.running);
        assert!(stats.last_error.unwrap().contains("Timed out"));

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        scheduler.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_recorded_and_job_keeps_ticking() {
        let shutdown = GracefulShutdown::with_defaults();
        let mut scheduler = JobScheduler::new(Duration::from_secs(5));
        scheduler.register(Arc::new(FailingJob));
        scheduler.start(shutdown.token());

        tokio::time::sleep(Duration::from_secs(130)).await;

        let snapshot = scheduler.stats().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].runs, 3);
        assert_eq!(snapshot[0].failures, 3);
        assert_eq!(snapshot[0].interval_secs, 60);

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        scheduler.join().await;
    }
}
