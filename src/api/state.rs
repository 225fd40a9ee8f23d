use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::adapters::{OAuthProvider, Store};
use crate::api::auth::AdminAuth;
use crate::domain::{SocialProvider, TradingSignal, WsMessage};
use crate::jobs::SchedulerStats;
use crate::services::{BadgeAwarder, OAuthStateRegistry};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend (Postgres or in-memory)
    pub store: Arc<dyn Store>,

    /// WebSocket broadcast channel
    pub ws_tx: broadcast::Sender<WsMessage>,

    /// New signals for the SSE stream
    pub signal_tx: broadcast::Sender<TradingSignal>,

    /// Configured OAuth clients; a missing provider answers 503
    pub oauth: Arc<HashMap<SocialProvider, Arc<dyn OAuthProvider>>>,

    pub oauth_states: Arc<OAuthStateRegistry>,

    pub badges: Arc<BadgeAwarder>,

    /// Scheduler stats (empty when jobs are disabled)
    pub jobs: SchedulerStats,

    pub admin: AdminAuth,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        broadcast_capacity: usize,
        oauth_state_ttl_secs: u64,
        admin: AdminAuth,
    ) -> Self {
        let capacity = broadcast_capacity.max(1);
        let (ws_tx, _) = broadcast::channel(capacity);
        let (signal_tx, _) = broadcast::channel(capacity);

        Self {
            badges: Arc::new(BadgeAwarder::new(store.clone())),
            store,
            ws_tx,
            signal_tx,
            oauth: Arc::new(HashMap::new()),
            oauth_states: Arc::new(OAuthStateRegistry::new(oauth_state_ttl_secs)),
            jobs: SchedulerStats::default(),
            admin,
            start_time: Utc::now(),
        }
    }

    pub fn with_oauth_provider(mut self, client: Arc<dyn OAuthProvider>) -> Self {
        let mut providers = (*self.oauth).clone();
        providers.insert(client.provider(), client);
        self.oauth = Arc::new(providers);
        self
    }

    pub fn with_job_stats(mut self, stats: SchedulerStats) -> Self {
        self.jobs = stats;
        self
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    /// Push a message to WebSocket subscribers; no subscribers is fine
    pub fn broadcast(&self, msg: WsMessage) {
        let _ = self.ws_tx.send(msg);
    }
}
