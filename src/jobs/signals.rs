use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use super::Job;
use crate::adapters::{SignalContext, SignalModel, Store};
use crate::config::JobsConfig;
use crate::domain::{TradingSignal, WsMessage};
use crate::error::Result;

const SPIKE_LOOKBACK_MINUTES: i64 = 60;
const MAX_CONTEXT_SPIKES: i64 = 20;

/// Asks the model for a signal based on the latest prices and recent spikes
pub struct SignalGenerationJob {
    model: Arc<dyn SignalModel>,
    store: Arc<dyn Store>,
    ws_tx: broadcast::Sender<WsMessage>,
    signal_tx: broadcast::Sender<TradingSignal>,
    interval: Duration,
}

impl SignalGenerationJob {
    pub fn new(
        model: Arc<dyn SignalModel>,
        store: Arc<dyn Store>,
        ws_tx: broadcast::Sender<WsMessage>,
        signal_tx: broadcast::Sender<TradingSignal>,
        jobs: &JobsConfig,
    ) -> Self {
        Self {
            model,
            store,
            ws_tx,
            signal_tx,
            interval: Duration::from_secs(jobs.signals_interval_secs),
        }
    }

    async fn build_context(&self) -> Result<SignalContext> {
        let since = Utc::now() - ChronoDuration::minutes(SPIKE_LOOKBACK_MINUTES);
        let spikes = self
            .store
            .recent_spikes(MAX_CONTEXT_SPIKES, None)
            .await?
            .into_iter()
            .filter(|s| s.detected_at >= since)
            .collect();

        Ok(SignalContext {
            prices: self.store.latest_prices().await?,
            spikes,
        })
    }
}

#[async_trait]
impl Job for SignalGenerationJob {
    fn name(&self) -> &'static str {
        "signals"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<()> {
        let context = self.build_context().await?;
        let draft = self.model.generate(&context).await?;

        let symbol = draft.symbol.trim().to_ascii_uppercase();
        let price = context
            .prices
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.price_usd);

        let signal = draft.into_signal(price)?;
        self.store.insert_signal(&signal).await?;

        info!(
            "New signal {} {} ({:.0}% confidence)",
            signal.action,
            signal.symbol,
            signal.confidence * 100.0
        );

        let _ = self.signal_tx.send(signal.clone());
        let _ = self.ws_tx.send(WsMessage::Signal(signal));
        Ok(())
    }
}
