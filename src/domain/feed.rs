use serde::{Deserialize, Serialize};

use super::{PricePoint, Spike, TradeNotification, TradingSignal};

/// Message pushed to every WebSocket subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "trade")]
    Trade(TradeNotification),
    #[serde(rename = "spike")]
    Spike(Spike),
    #[serde(rename = "price")]
    Price(Vec<PricePoint>),
    #[serde(rename = "signal")]
    Signal(TradingSignal),
}

impl WsMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trade(_) => "trade",
            Self::Spike(_) => "spike",
            Self::Price(_) => "price",
            Self::Signal(_) => "signal",
        }
    }
}
