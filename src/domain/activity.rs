use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of user activity recorded in the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Trade,
    SignalResponse,
    Referral,
    SocialLink,
    BadgeAwarded,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::SignalResponse => "signal_response",
            Self::Referral => "referral",
            Self::SocialLink => "social_link",
            Self::BadgeAwarded => "badge_awarded",
        }
    }

    /// Points granted for one event of this kind
    pub fn points(&self) -> i64 {
        match self {
            Self::Trade => 10,
            Self::SignalResponse => 5,
            Self::Referral => 50,
            Self::SocialLink => 20,
            Self::BadgeAwarded => 0,
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trade" => Ok(Self::Trade),
            "signal_response" => Ok(Self::SignalResponse),
            "referral" => Ok(Self::Referral),
            "social_link" => Ok(Self::SocialLink),
            "badge_awarded" => Ok(Self::BadgeAwarded),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_address: String,
    pub kind: ActivityKind,
    pub points: i64,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(user_address: &str, kind: ActivityKind, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_address: user_address.to_string(),
            kind,
            points: kind.points(),
            details,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_address: String,
    pub points: i64,
    pub events: i64,
}
