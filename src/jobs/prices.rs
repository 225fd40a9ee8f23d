use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use super::Job;
use crate::adapters::{BlockchainClient, Store};
use crate::config::{BlockchainConfig, JobsConfig};
use crate::domain::{PricePoint, WsMessage};
use crate::error::Result;

/// Pulls USD prices for the tracked symbols and pushes them to subscribers
pub struct PriceUpdateJob {
    client: Arc<dyn BlockchainClient>,
    store: Arc<dyn Store>,
    ws_tx: broadcast::Sender<WsMessage>,
    symbols: Vec<String>,
    interval: Duration,
}

impl PriceUpdateJob {
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
            symbols: blockchain
                .price_symbols
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            interval: Duration::from_secs(jobs.prices_interval_secs),
        }
    }
}

#[async_trait]
impl Job for PriceUpdateJob {
    fn name(&self) -> &'static str {
        "prices"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self), fields(symbols = self.symbols.len()))]
    async fn run(&self) -> Result<()> {
        if self.symbols.is_empty() {
            debug!("No price symbols configured");
            return Ok(());
        }

        let prices = self.client.token_prices(&self.symbols).await?;
        let captured_at = Utc::now();

        let mut points: Vec<PricePoint> = self
            .symbols
            .iter()
            .filter_map(|symbol| {
                prices.get(symbol).map(|price| PricePoint {
                    symbol: symbol.clone(),
                    price_usd: *price,
                    captured_at,
                })
            })
            .collect();
        points.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        if points.len() < self.symbols.len() {
            warn!(
                "Price provider returned {} of {} symbols",
                points.len(),
                self.symbols.len()
            );
        }
        if points.is_empty() {
            return Ok(());
        }

        self.store.insert_prices(&points).await?;
        let _ = self.ws_tx.send(WsMessage::Price(points));
        Ok(())
    }
}
