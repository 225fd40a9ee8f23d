use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::Job;
use crate::adapters::{BlockchainClient, Store};
use crate::config::{BlockchainConfig, JobsConfig, TrackedToken};
use crate::domain::{HolderSnapshot, Spike, WsMessage};
use crate::error::Result;

/// Snapshots holder/transfer counts for each tracked token and records a
/// spike when transfer activity jumps past the threshold.
pub struct HolderSnapshotJob {
    client: Arc<dyn BlockchainClient>,
    store: Arc<dyn Store>,
    ws_tx: broadcast::Sender<WsMessage>,
    tokens: Vec<TrackedToken>,
    interval: Duration,
    window_secs: u64,
    threshold_pct: f64,
}

impl HolderSnapshotJob {
    pub fn new(
        client: Arc<dyn BlockchainClient>,
        store: Arc<dyn Store>,
        ws_tx: broadcast::Sender<WsMessage>,
        blockchain: &BlockchainConfig,
        jobs: &JobsConfig,
    ) -> Self {
        Self {
            client,
            store,
            ws_tx,
            tokens: blockchain.tracked_tokens.clone(),
            interval: Duration::from_secs(jobs.holders_interval_secs),
            window_secs: jobs.spike_window_secs,
            threshold_pct: jobs.spike_threshold_pct,
        }
    }

    async fn snapshot_token(&self, token: &TrackedToken) -> Result<Option<Spike>> {
        let address = token.address.to_ascii_lowercase();
        let activity = self.client.token_activity(&address, self.window_secs).await?;
        let previous = self.store.latest_snapshot(&address).await?;

        let current = HolderSnapshot {
            token_address: address,
            token_symbol: token.symbol.clone(),
            holder_count: activity.holder_count,
            transfer_count: activity.transfer_count,
            captured_at: Utc::now(),
        };
        self.store.insert_snapshot(&current).await?;

        let spike = previous.and_then(|prev| {
            Spike::detect(&prev, &current, self.window_secs as i64, self.threshold_pct)
        });

        if let Some(spike) = &spike {
            self.store.insert_spike(spike).await?;
            info!(
                "Spike on {}: {} -> {} transfers (+{:.1}%)",
                spike.token_symbol, spike.previous_count, spike.current_count, spike.change_pct
            );
            // No subscribers is fine
            let _ = self.ws_tx.send(WsMessage::Spike(spike.clone()));
        }

        Ok(spike)
    }
}

#[async_trait]
impl Job for HolderSnapshotJob {
    fn name(&self) -> &'static str {
        "holders"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self), fields(tokens = self.tokens.len()))]
    async fn run(&self) -> Result<()> {
        let mut last_error = None;
        let mut failed = 0usize;

        for token in &self.tokens {
            if let Err(e) = self.snapshot_token(token).await {
                warn!("Holder snapshot for {} failed: {}", token.symbol, e);
                failed += 1;
                last_error = Some(e);
            }
        }

        // Partial success still counts as a successful run
        match last_error {
            Some(e) if failed == self.tokens.len() => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::blockchain::MockBlockchainClient;
    use crate::adapters::{MemoryStore, TokenActivity};
    use crate::error::GorillionaireError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "0x00000000000000000000000000000000000000c0";

    fn configs() -> (BlockchainConfig, JobsConfig) {
        let blockchain = BlockchainConfig {
            tracked_tokens: vec![TrackedToken {
                address: TOKEN.to_string(),
                symbol: "CHOG".to_string(),
            }],
            ..BlockchainConfig::default()
        };
        let jobs = JobsConfig {
            spike_window_secs: 900,
            spike_threshold_pct: 50.0,
            ..JobsConfig::default()
        };
        (blockchain, jobs)
    }

    #[tokio::test]
    async fn test_spike_recorded_and_broadcast() {
        let transfer_counts = [100i64, 140, 300];
        let calls = Arc::new(AtomicUsize::new(0));

        let mut client = MockBlockchainClient::new();
        let counter = calls.clone();
        client
            .expect_token_activity()
            .withf(|address, window| address == TOKEN && *window == 900)
            .times(3)
            .returning(move |_, _| {
                let i = counter.fetch_add(1, Ordering::SeqCst);
                Ok(TokenActivity {
                    holder_count: 10,
                    transfer_count: transfer_counts[i],
                })
            });

        let store = Arc::new(MemoryStore::new());
        let (ws_tx, mut ws_rx) = broadcast::channel(16);
        let (blockchain, jobs) = configs();
        let job = HolderSnapshotJob::new(Arc::new(client), store.clone(), ws_tx, &blockchain, &jobs);

        job.run().await.unwrap(); // baseline
        job.run().await.unwrap(); // +40%, below threshold
        assert!(store.recent_spikes(10, None).await.unwrap().is_empty());

        job.run().await.unwrap(); // +114%
        let spikes = store.recent_spikes(10, Some(TOKEN)).await.unwrap();
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].previous_count, 140);
        assert_eq!(spikes[0].current_count, 300);
        assert_eq!(spikes[0].window_secs, 900);

        match ws_rx.recv().await.unwrap() {
            WsMessage::Spike(spike) => assert_eq!(spike.token_symbol, "CHOG"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(
            store.latest_snapshot(TOKEN).await.unwrap().unwrap().transfer_count,
            300
        );
    }

    #[tokio::test]
    async fn test_all_tokens_failing_fails_the_run() {
        let mut client = MockBlockchainClient::new();
        client
            .expect_token_activity()
            .returning(|_, _| Err(GorillionaireError::upstream("blockchain", "503")));

        let (ws_tx, _rx) = broadcast::channel(16);
        let (blockchain, jobs) = configs();
        let job = HolderSnapshotJob::new(
            Arc::new(client),
            Arc::new(MemoryStore::new()),
            ws_tx,
            &blockchain,
            &jobs,
        );

        assert!(job.run().await.is_err());
    }
}
