use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{GorillionaireError, Result};

/// Direction of a trading recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalAction {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Self::Buy),
            "SELL" | "SHORT" => Ok(Self::Sell),
            other => Err(format!("unknown signal action: {other}")),
        }
    }
}

/// LLM-generated recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: Uuid,
    pub symbol: String,
    pub action: SignalAction,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    pub price_usd: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Raw model output before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDraft {
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl SignalDraft {
    /// Validate the draft and turn it into a signal.
    ///
    /// Confidence in (1, 100] is read as a percentage.
    pub fn into_signal(self, price_usd: Option<Decimal>) -> Result<TradingSignal> {
        let symbol = self.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(GorillionaireError::Validation(
                "signal symbol is empty".to_string(),
            ));
        }

        let action = self
            .action
            .parse::<SignalAction>()
            .map_err(GorillionaireError::Validation)?;

        let confidence = match self.confidence {
            c if !c.is_finite() || c < 0.0 => None,
            c if c <= 1.0 => Some(c),
            c if c <= 100.0 => Some(c / 100.0),
            _ => None,
        }
        .ok_or_else(|| {
            GorillionaireError::Validation(format!(
                "signal confidence out of range: {}",
                self.confidence
            ))
        })?;

        Ok(TradingSignal {
            id: Uuid::new_v4(),
            symbol,
            action,
            confidence,
            reasoning: self.reasoning.trim().to_string(),
            price_usd,
            created_at: Utc::now(),
        })
    }
}

/// A user's answer to a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalChoice {
    Accept,
    Refuse,
}

impl SignalChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Refuse => "refuse",
        }
    }
}

impl FromStr for SignalChoice {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" => Ok(Self::Accept),
            "refuse" | "refused" | "reject" => Ok(Self::Refuse),
            other => Err(format!("unknown signal choice: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSignal {
    pub id: Uuid,
    pub user_address: String,
    pub signal_id: Uuid,
    pub choice: SignalChoice,
    pub created_at: DateTime<Utc>,
}

impl UserSignal {
    pub fn new(user_address: &str, signal_id: Uuid, choice: SignalChoice) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_address: user_address.to_string(),
            signal_id,
            choice,
            created_at: Utc::now(),
        }
    }
}

/// Trade executed by a user, announced on the WebSocket channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeNotification {
    pub id: Uuid,
    pub user_address: String,
    pub symbol: String,
    pub side: SignalAction,
    pub amount: Decimal,
    pub price_usd: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub signal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(action: &str, confidence: f64) -> SignalDraft {
        SignalDraft {
            symbol: " chog ".to_string(),
            action: action.to_string(),
            confidence,
            reasoning: "volume spike".to_string(),
        }
    }

    #[test]
    fn test_draft_into_signal_normalizes() {
        let signal = draft("buy", 0.8).into_signal(None).unwrap();
        assert_eq!(signal.symbol, "CHOG");
        assert_eq!(signal.action, SignalAction::Buy);
        assert!((signal.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_confidence_is_scaled() {
        let signal = draft("SELL", 75.0).into_signal(None).unwrap();
        assert!((signal.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_drafts_are_rejected() {
        assert!(draft("HOLD", 0.5).into_signal(None).is_err());
        assert!(draft("BUY", -0.1).into_signal(None).is_err());
        assert!(draft("BUY", 101.0).into_signal(None).is_err());
        assert!(draft("BUY", f64::NAN).into_signal(None).is_err());

        let mut empty = draft("BUY", 0.5);
        empty.symbol = "  ".to_string();
        assert!(empty.into_signal(None).is_err());
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!("Accept".parse::<SignalChoice>().unwrap(), SignalChoice::Accept);
        assert_eq!("refused".parse::<SignalChoice>().unwrap(), SignalChoice::Refuse);
        assert!("maybe".parse::<SignalChoice>().is_err());
    }
}
