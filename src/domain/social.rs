use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Discord,
    Twitter,
}

impl SocialProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Twitter => "twitter",
        }
    }
}

impl std::fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SocialProvider {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "twitter" | "x" => Ok(Self::Twitter),
            other => Err(format!("unknown social provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialAccount {
    pub user_address: String,
    pub provider: SocialProvider,
    pub external_id: String,
    pub username: String,
    pub linked_at: DateTime<Utc>,
}

/// Per-wallet feature flag for the V2 interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub address: String,
    pub has_v2_access: bool,
    pub updated_at: DateTime<Utc>,
}
