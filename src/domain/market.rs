use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time holder/transfer counts for a tracked token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub token_address: String,
    pub token_symbol: String,
    pub holder_count: i64,
    /// Transfers observed during the spike window ending at `captured_at`
    pub transfer_count: i64,
    pub captured_at: DateTime<Utc>,
}

/// Short-window jump in transfer activity for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub id: Uuid,
    pub token_address: String,
    pub token_symbol: String,
    pub window_secs: i64,
    pub previous_count: i64,
    pub current_count: i64,
    pub change_pct: f64,
    pub detected_at: DateTime<Utc>,
}

impl Spike {
    /// Compare two consecutive snapshots of the same token.
    ///
    /// A zero baseline never produces a spike: the percentage is undefined and
    /// the first snapshot after a quiet period would otherwise always fire.
    pub fn detect(
        previous: &HolderSnapshot,
        current: &HolderSnapshot,
        window_secs: i64,
        threshold_pct: f64,
    ) -> Option<Self> {
        if previous.transfer_count <= 0 {
            return None;
        }

        let change_pct = (current.transfer_count - previous.transfer_count) as f64
            / previous.transfer_count as f64
            * 100.0;

        if change_pct < threshold_pct {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            token_address: current.token_address.clone(),
            token_symbol: current.token_symbol.clone(),
            window_secs,
            previous_count: previous.transfer_count,
            current_count: current.transfer_count,
            change_pct,
            detected_at: current.captured_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub price_usd: Decimal,
    pub captured_at: DateTime<Utc>,
}
