use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AccessRecord, ActivityEvent, Badge, HolderSnapshot, LeaderboardEntry, PricePoint, Referral,
    ReferralCode, SocialAccount, Spike, TradeNotification, TradingSignal, UserBadge, UserProgress,
    UserSignal,
};
use crate::error::Result;

/// Persistence boundary for every record the service owns.
///
/// Implementations report uniqueness violations as `Conflict` so handlers can
/// map them to 409 without knowing the backend.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    // ==================== Badges ====================

    async fn list_badges(&self) -> Result<Vec<Badge>>;

    async fn insert_badge(&self, badge: &Badge) -> Result<()>;

    /// Returns false when the user already holds the badge
    async fn award_badge(&self, award: &UserBadge) -> Result<bool>;

    async fn user_badges(&self, user_address: &str) -> Result<Vec<UserBadge>>;

    // ==================== Signals ====================

    async fn insert_signal(&self, signal: &TradingSignal) -> Result<()>;

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>>;

    /// Newest first
    async fn latest_signals(&self, limit: i64, symbol: Option<&str>)
        -> Result<Vec<TradingSignal>>;

    async fn insert_user_signal(&self, response: &UserSignal) -> Result<()>;

    async fn user_signals(&self, user_address: &str) -> Result<Vec<UserSignal>>;

    // ==================== Activity ====================

    async fn insert_activity(&self, event: &ActivityEvent) -> Result<()>;

    /// Newest first
    async fn recent_activity(&self, user_address: &str, limit: i64)
        -> Result<Vec<ActivityEvent>>;

    async fn total_points(&self, user_address: &str) -> Result<i64>;

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    async fn user_progress(&self, user_address: &str) -> Result<UserProgress>;

    async fn insert_trade(&self, trade: &TradeNotification) -> Result<()>;

    // ==================== Referrals ====================

    async fn referral_code(&self, user_address: &str) -> Result<Option<ReferralCode>>;

    async fn insert_referral_code(&self, code: &ReferralCode) -> Result<()>;

    async fn referral_code_owner(&self, code: &str) -> Result<Option<String>>;

    async fn insert_referral(&self, referral: &Referral) -> Result<()>;

    async fn referred_by(&self, user_address: &str) -> Result<Option<String>>;

    async fn referral_count(&self, user_address: &str) -> Result<i64>;

    // ==================== Access ====================

    async fn get_access(&self, address: &str) -> Result<Option<AccessRecord>>;

    async fn set_access(&self, address: &str, has_v2_access: bool) -> Result<AccessRecord>;

    // ==================== Social ====================

    /// Link or relink an account. An external account already linked to a
    /// different wallet is a conflict.
    async fn link_social(&self, account: &SocialAccount) -> Result<()>;

    async fn social_accounts(&self, user_address: &str) -> Result<Vec<SocialAccount>>;

    // ==================== Market data ====================

    async fn insert_snapshot(&self, snapshot: &HolderSnapshot) -> Result<()>;

    async fn latest_snapshot(&self, token_address: &str) -> Result<Option<HolderSnapshot>>;

    async fn insert_spike(&self, spike: &Spike) -> Result<()>;

    /// Newest first
    async fn recent_spikes(&self, limit: i64, token_address: Option<&str>) -> Result<Vec<Spike>>;

    async fn insert_prices(&self, prices: &[PricePoint]) -> Result<()>;

    /// Most recent price per symbol
    async fn latest_prices(&self) -> Result<Vec<PricePoint>>;
}
