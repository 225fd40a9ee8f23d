//! Blockchain-data provider client
//!
//! Used by the scheduled jobs to read holder/transfer counts for tracked
//! tokens and USD prices for tracked symbols.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BlockchainConfig;
use crate::error::{GorillionaireError, Result};

/// Holder and transfer counts for one token over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenActivity {
    pub holder_count: i64,
    pub transfer_count: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    async fn token_activity(&self, token_address: &str, window_secs: u64)
        -> Result<TokenActivity>;

    async fn token_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>>;
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    prices: HashMap<String, Decimal>,
}

/// HTTP client for the blockchain-data REST API
pub struct HttpBlockchainClient {
    config: BlockchainConfig,
    http: Client,
}

impl HttpBlockchainClient {
    pub fn new(config: BlockchainConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GorillionaireError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .header("x-api-key", &self.config.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Blockchain API {} returned {}: {}", path, status, body);
            return Err(GorillionaireError::upstream(
                "blockchain",
                format!("{} returned {}", path, status),
            ));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BlockchainClient for HttpBlockchainClient {
    async fn token_activity(
        &self,
        token_address: &str,
        window_secs: u64,
    ) -> Result<TokenActivity> {
        let activity: TokenActivity = self
            .get_json(
                &format!("tokens/{}/activity", token_address),
                &[("window_secs", window_secs.to_string())],
            )
            .await?;

        debug!(
            "Token {} activity: {} holders, {} transfers",
            token_address, activity.holder_count, activity.transfer_count
        );
        Ok(activity)
    }

    async fn token_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let response: PricesResponse = self
            .get_json("prices", &[("symbols", symbols.join(","))])
            .await?;

        Ok(response
            .prices
            .into_iter()
            .map(|(symbol, price)| (symbol.to_ascii_uppercase(), price))
            .collect())
    }
}
