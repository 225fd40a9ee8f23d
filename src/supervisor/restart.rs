//! Restart supervisor
//!
//! Runs a service in its own task and restarts it when it fails or panics,
//! backing off exponentially between attempts. Restarts are counted in a
//! sliding window; once the limit is reached inside the window the
//! supervisor gives up.

use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::coordination::ShutdownToken;
use crate::error::{GorillionaireError, Result};

/// Event emitted by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Started { service: String, attempt: u32 },
    Failed { service: String, error: String },
    Restarting { service: String, attempt: u32, delay_ms: u64 },
    Exhausted { service: String, attempts: u32 },
    Stopped { service: String },
}

/// Delay before restart number `restart` (1-based) with a jitter sample in
/// [-1, 1]: `initial * 2^(restart-1)`, capped at `max`, then scaled by
/// `1 + jitter_pct * sample`.
pub fn backoff_delay(config: &SupervisorConfig, restart: u32, jitter_sample: f64) -> Duration {
    let exponent = restart.saturating_sub(1).min(31);
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_ms);

    let factor = 1.0 + config.jitter_pct.clamp(0.0, 1.0) * jitter_sample.clamp(-1.0, 1.0);
    Duration::from_millis((base as f64 * factor).round().max(0.0) as u64)
}

pub struct Supervisor {
    service: String,
    config: SupervisorConfig,
    event_tx: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(service: impl Into<String>, config: SupervisorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            service: service.into(),
            config,
            event_tx,
        }
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Supervise the service built by `factory` until it exits cleanly, the
    /// shutdown signal fires, or restarts are exhausted.
    pub async fn run<F, Fut>(&self, mut shutdown: ShutdownToken, mut factory: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let window = Duration::from_secs(self.config.restart_window_secs);
        let mut restarts: VecDeque<Instant> = VecDeque::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            info!("Starting {} (attempt {})", self.service, attempt);
            self.emit(SupervisorEvent::Started {
                service: self.service.clone(),
                attempt,
            });

            let mut handle = tokio::spawn(factory());
            let outcome = tokio::select! {
                joined = &mut handle => joined,
                _ = shutdown.wait_for_shutdown() => {
                    // The service watches the same signal; let it finish draining
                    if let Err(e) = handle.await {
                        warn!("{} ended abnormally during shutdown: {}", self.service, e);
                    }
                    self.stopped();
                    return Ok(());
                }
            };

            let failure = match outcome {
                Ok(Ok(())) => {
                    self.stopped();
                    return Ok(());
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) if e.is_panic() => format!("panicked: {}", panic_message(e)),
                Err(e) => format!("task cancelled: {}", e),
            };

            error!("{} failed: {}", self.service, failure);
            self.emit(SupervisorEvent::Failed {
                service: self.service.clone(),
                error: failure,
            });

            let now = Instant::now();
            while restarts
                .front()
                .is_some_and(|t| now.duration_since(*t) >= window)
            {
                restarts.pop_front();
            }

            if restarts.len() >= self.config.max_restarts as usize {
                let attempts = restarts.len() as u32;
                error!(
                    "{} exhausted {} restarts within {}s, giving up",
                    self.service, attempts, self.config.restart_window_secs
                );
                self.emit(SupervisorEvent::Exhausted {
                    service: self.service.clone(),
                    attempts,
                });
                return Err(GorillionaireError::RestartsExhausted {
                    attempts,
                    window_secs: self.config.restart_window_secs,
                });
            }

            restarts.push_back(now);
            let restart = restarts.len() as u32;
            let delay = backoff_delay(
                &self.config,
                restart,
                rand::thread_rng().gen_range(-1.0..=1.0),
            );

            warn!(
                "Restarting {} in {:?} (restart {} of {} within window)",
                self.service, delay, restart, self.config.max_restarts
            );
            self.emit(SupervisorEvent::Restarting {
                service: self.service.clone(),
                attempt: restart,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for_shutdown() => {
                    self.stopped();
                    return Ok(());
                }
            }
        }
    }

    fn stopped(&self) {
        info!("{} stopped", self.service);
        self.emit(SupervisorEvent::Stopped {
            service: self.service.clone(),
        });
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
