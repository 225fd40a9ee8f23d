//! Process shutdown
//!
//! One shutdown signal fans out to the HTTP server, the job scheduler and the
//! supervisor; the sequence then stops jobs, drains the server and closes the
//! store, each step bounded by its own timeout.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// How the shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM or SIGINT
    Graceful,
    /// SIGQUIT; every step gets a shorter budget
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Per-step time budgets
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for running jobs to finish (default: 30s)
    pub job_stop_timeout_secs: u64,
    /// Time to wait for in-flight HTTP requests and sockets (default: 15s)
    pub server_drain_timeout_secs: u64,
    /// Time to wait for the store to close (default: 10s)
    pub store_close_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            job_stop_timeout_secs: 30,
            server_drain_timeout_secs: 15,
            store_close_timeout_secs: 10,
        }
    }
}

impl ShutdownConfig {
    /// Urgent shutdowns get a fifth of every budget
    fn scaled(&self, signal: ShutdownSignal) -> Self {
        match signal {
            ShutdownSignal::Graceful => self.clone(),
            ShutdownSignal::Urgent => Self {
                job_stop_timeout_secs: (self.job_stop_timeout_secs / 5).max(1),
                server_drain_timeout_secs: (self.server_drain_timeout_secs / 5).max(1),
                store_close_timeout_secs: (self.store_close_timeout_secs / 5).max(1),
            },
        }
    }
}

/// Where the shutdown sequence currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    StoppingJobs,
    DrainingServer,
    ClosingStore,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::StoppingJobs => write!(f, "stopping_jobs"),
            ShutdownPhase::DrainingServer => write!(f, "draining_server"),
            ShutdownPhase::ClosingStore => write!(f, "closing_store"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

pub type ShutdownStep = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Owns the shutdown request and drives the shutdown sequence
pub struct GracefulShutdown {
    config: ShutdownConfig,
    shutdown_requested: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    signal_tx: broadcast::Sender<ShutdownSignal>,
    requested_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        let (signal_tx, _) = broadcast::channel(8);
        let (requested_tx, _) = watch::channel(None);

        Self {
            config,
            shutdown_requested: AtomicBool::new(false),
            phase,
            signal_tx,
            requested_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.signal_tx.subscribe()
    }

    /// Watch phase transitions
    pub fn phase_receiver(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Broadcast the request; later calls are ignored
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(signal);
        self.requested_tx.send_replace(Some(signal));
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Token for tasks that need to wait on the shutdown request.
    ///
    /// Unlike a raw broadcast receiver, a token created after the request
    /// still observes it.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            requested_rx: self.requested_tx.subscribe(),
        }
    }

    /// Execute the shutdown sequence: stop jobs, drain the server, close the store
    pub async fn execute(
        &self,
        signal: ShutdownSignal,
        stop_jobs: ShutdownStep,
        drain_server: ShutdownStep,
        close_store: ShutdownStep,
    ) {
        let start = std::time::Instant::now();
        let config = self.config.scaled(signal);

        self.set_phase(ShutdownPhase::StoppingJobs);
        if tokio::time::timeout(Duration::from_secs(config.job_stop_timeout_secs), stop_jobs)
            .await
            .is_err()
        {
            warn!(
                "Jobs did not stop within {}s, proceeding anyway",
                config.job_stop_timeout_secs
            );
        } else {
            debug!("Scheduled jobs stopped");
        }

        self.set_phase(ShutdownPhase::DrainingServer);
        if tokio::time::timeout(
            Duration::from_secs(config.server_drain_timeout_secs),
            drain_server,
        )
        .await
        .is_err()
        {
            warn!(
                "Server drain timeout after {}s",
                config.server_drain_timeout_secs
            );
        } else {
            debug!("HTTP server drained");
        }

        self.set_phase(ShutdownPhase::ClosingStore);
        if tokio::time::timeout(
            Duration::from_secs(config.store_close_timeout_secs),
            close_store,
        )
        .await
        .is_err()
        {
            error!("Store close timeout after {}s", config.store_close_timeout_secs);
        }

        self.set_phase(ShutdownPhase::Complete);
        info!("Graceful shutdown completed in {:?}", start.elapsed());
    }
}

/// Cloneable handle that resolves once shutdown is requested
#[derive(Clone)]
pub struct ShutdownToken {
    requested_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested_rx.borrow().is_some()
    }

    /// Resolve once shutdown is requested (immediately if it already was)
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.requested_rx.borrow_and_update() {
                return signal;
            }
            if self.requested_rx.changed().await.is_err() {
                // Coordinator dropped: nothing can cancel us any more
                return ShutdownSignal::Urgent;
            }
        }
    }
}

/// Spawn a task translating Unix signals into shutdown requests
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, level) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                stream.recv().await;
                info!("Received {}", name);
                shutdown.request_shutdown(level);
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            info!("Received Ctrl+C");
            shutdown.request_shutdown(ShutdownSignal::Graceful);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_phase_display() {
        assert_eq!(ShutdownPhase::Running.to_string(), "running");
        assert_eq!(ShutdownPhase::DrainingServer.to_string(), "draining_server");
        assert_eq!(ShutdownPhase::Complete.to_string(), "complete");
    }

    #[tokio::test]
    async fn test_duplicate_request_is_ignored() {
        let shutdown = GracefulShutdown::with_defaults();
        let mut rx = shutdown.subscribe();
        assert!(!shutdown.is_shutdown_requested());

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        shutdown.request_shutdown(ShutdownSignal::Urgent);

        assert!(shutdown.is_shutdown_requested());
        assert_eq!(rx.recv().await.unwrap(), ShutdownSignal::Graceful);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_token_created_after_request_still_fires() {
        let shutdown = GracefulShutdown::with_defaults();
        shutdown.request_shutdown(ShutdownSignal::Urgent);

        let mut token = shutdown.token();
        assert!(token.is_shutdown_requested());
        assert_eq!(token.wait_for_shutdown().await, ShutdownSignal::Urgent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_runs_steps_in_order_and_times_out_slow_steps() {
        let shutdown = GracefulShutdown::with_defaults();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let step = |name: &'static str, delay_secs: u64| -> ShutdownStep {
            let order = order.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                order.lock().unwrap().push(name);
            })
        };

        shutdown
            .execute(
                ShutdownSignal::Graceful,
                step("jobs", 1),
                step("server", 3600),
                step("store", 0),
            )
            .await;

        assert_eq!(*order.lock().unwrap(), vec!["jobs", "store"]);
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Complete);
    }
}
