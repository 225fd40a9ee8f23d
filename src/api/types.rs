use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Badge, BadgeCriterion, SocialAccount, TradeNotification, UserSignal};
use crate::jobs::JobStats;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
pub const MAX_ACTIVITY_LIMIT: i64 = 200;
pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Clamp an optional `limit` query parameter
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

// ==================== System ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobStats>,
}

// ==================== Activity ====================

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub user_address: String,
    pub kind: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsResponse {
    pub address: String,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub user_address: String,
    pub symbol: String,
    pub side: String,
    pub amount: Decimal,
    #[serde(default)]
    pub price_usd: Option<Decimal>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub signal_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeResponse {
    pub trade: TradeNotification,
    pub points_awarded: i64,
    pub badges_awarded: Vec<Badge>,
}

// ==================== Signals ====================

#[derive(Debug, Default, Deserialize)]
pub struct SignalsQuery {
    pub limit: Option<i64>,
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub user_address: String,
    pub choice: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondResponse {
    pub response: UserSignal,
    pub points_awarded: i64,
    pub badges_awarded: Vec<Badge>,
}

// ==================== Referral ====================

#[derive(Debug, Deserialize)]
pub struct ReferralCodeRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCodeResponse {
    pub address: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub address: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub referrer: String,
    pub referee: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralSummary {
    pub address: String,
    pub code: Option<String>,
    pub referred_by: Option<String>,
    pub referrals: i64,
}

// ==================== Access ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub address: String,
    pub has_access: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetAccessRequest {
    pub has_access: bool,
}

// ==================== Social ====================

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denies access
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialLinkResponse {
    pub account: SocialAccount,
    pub points_awarded: i64,
    pub badges_awarded: Vec<Badge>,
}

// ==================== Badges ====================

#[derive(Debug, Deserialize)]
pub struct CreateBadgeRequest {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub criterion: BadgeCriterion,
}

#[derive(Debug, Clone, Serialize)]
pub struct EarnedBadge {
    pub badge: Badge,
    pub awarded_at: DateTime<Utc>,
}

// ==================== Spikes ====================

#[derive(Debug, Default, Deserialize)]
pub struct SpikesQuery {
    pub limit: Option<i64>,
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
        assert_eq!(clamp_limit(Some(5000), 50, 200), 200);
    }
}
