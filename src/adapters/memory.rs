use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adapters::Store;
use crate::domain::{
    AccessRecord, ActivityEvent, Badge, HolderSnapshot, LeaderboardEntry,
    PricePoint, Referral, ReferralCode, SignalChoice, SocialAccount, Spike, TradeNotification,
    TradingSignal, UserBadge, UserProgress, UserSignal,
};
use crate::error::{GorillionaireError, Result};

#[derive(Default)]
struct MemoryState {
    badges: Vec<Badge>,
    user_badges: Vec<UserBadge>,
    signals: Vec<TradingSignal>,
    user_signals: Vec<UserSignal>,
    activity: Vec<ActivityEvent>,
    trades: Vec<TradeNotification>,
    referral_codes: HashMap<String, ReferralCode>,
    referrals: Vec<Referral>,
    access: HashMap<String, AccessRecord>,
    social: Vec<SocialAccount>,
    snapshots: Vec<HolderSnapshot>,
    spikes: Vec<Spike>,
    prices: Vec<PricePoint>,
}

/// In-process store with the same uniqueness rules as the Postgres schema.
///
/// Backs the test suite and `database.url = "memory://"` deployments.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K, limit: i64) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by(|a, b| key(b).cmp(&key(a)));
    out.truncate(limit.max(0) as usize);
    out
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_badges(&self) -> Result<Vec<Badge>> {
        let state = self.state.read().await;
        let mut badges = state.badges.clone();
        badges.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(badges)
    }

    async fn insert_badge(&self, badge: &Badge) -> Result<()> {
        let mut state = self.state.write().await;
        if state.badges.iter().any(|b| b.slug == badge.slug) {
            return Err(GorillionaireError::Conflict(format!(
                "badge {} already exists",
                badge.slug
            )));
        }
        state.badges.push(badge.clone());
        Ok(())
    }

    async fn award_badge(&self, award: &UserBadge) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .user_badges
            .iter()
            .any(|ub| ub.user_address == award.user_address && ub.badge_id == award.badge_id)
        {
            return Ok(false);
        }
        state.user_badges.push(award.clone());
        Ok(true)
    }

    async fn user_badges(&self, user_address: &str) -> Result<Vec<UserBadge>> {
        let state = self.state.read().await;
        let mut out: Vec<_> = state
            .user_badges
            .iter()
            .filter(|ub| ub.user_address == user_address)
            .cloned()
            .collect();
        out.sort_by_key(|ub| ub.awarded_at);
        Ok(out)
    }

    async fn insert_signal(&self, signal: &TradingSignal) -> Result<()> {
        self.state.write().await.signals.push(signal.clone());
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>> {
        let state = self.state.read().await;
        Ok(state.signals.iter().find(|s| s.id == id).cloned())
    }

    async fn latest_signals(
        &self,
        limit: i64,
        symbol: Option<&str>,
    ) -> Result<Vec<TradingSignal>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .signals
                .iter()
                .filter(|s| symbol.map_or(true, |sym| s.symbol.eq_ignore_ascii_case(sym)))
                .cloned(),
            |s| s.created_at,
            limit,
        ))
    }

    async fn insert_user_signal(&self, response: &UserSignal) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .user_signals
            .iter()
            .any(|us| us.user_address == response.user_address && us.signal_id == response.signal_id)
        {
            return Err(GorillionaireError::Conflict(format!(
                "{} already responded to signal {}",
                response.user_address, response.signal_id
            )));
        }
        state.user_signals.push(response.clone());
        Ok(())
    }

    async fn user_signals(&self, user_address: &str) -> Result<Vec<UserSignal>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .user_signals
                .iter()
                .filter(|us| us.user_address == user_address)
                .cloned(),
            |us| us.created_at,
            i64::MAX,
        ))
    }

    async fn insert_activity(&self, event: &ActivityEvent) -> Result<()> {
        self.state.write().await.activity.push(event.clone());
        Ok(())
    }

    async fn recent_activity(
        &self,
        user_address: &str,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .activity
                .iter()
                .filter(|e| e.user_address == user_address)
                .cloned(),
            |e| e.created_at,
            limit,
        ))
    }

    async fn total_points(&self, user_address: &str) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .activity
            .iter()
            .filter(|e| e.user_address == user_address)
            .map(|e| e.points)
            .sum())
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let state = self.state.read().await;
        let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();
        for event in &state.activity {
            let entry = totals.entry(event.user_address.as_str()).or_default();
            entry.0 += event.points;
            entry.1 += 1;
        }

        let mut board: Vec<LeaderboardEntry> = totals
            .into_iter()
            .map(|(user_address, (points, events))| LeaderboardEntry {
                user_address: user_address.to_string(),
                points,
                events,
            })
            .collect();
        board.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.user_address.cmp(&b.user_address))
        });
        board.truncate(limit.max(0) as usize);
        Ok(board)
    }

    async fn user_progress(&self, user_address: &str) -> Result<UserProgress> {
        let state = self.state.read().await;
        let count = |n: usize| n as u32;
        Ok(UserProgress {
            signals_accepted: count(
                state
                    .user_signals
                    .iter()
                    .filter(|us| us.user_address == user_address && us.choice == SignalChoice::Accept)
                    .count(),
            ),
            referrals: count(
                state
                    .referrals
                    .iter()
                    .filter(|r| r.referrer_address == user_address)
                    .count(),
            ),
            trades: count(
                state
                    .trades
                    .iter()
                    .filter(|t| t.user_address == user_address)
                    .count(),
            ),
            social_accounts: count(
                state
                    .social
                    .iter()
                    .filter(|s| s.user_address == user_address)
                    .count(),
            ),
        })
    }

    async fn insert_trade(&self, trade: &TradeNotification) -> Result<()> {
        self.state.write().await.trades.push(trade.clone());
        Ok(())
    }

    async fn referral_code(&self, user_address: &str) -> Result<Option<ReferralCode>> {
        Ok(self.state.read().await.referral_codes.get(user_address).cloned())
    }

    async fn insert_referral_code(&self, code: &ReferralCode) -> Result<()> {
        let mut state = self.state.write().await;
        if state.referral_codes.contains_key(&code.user_address)
            || state.referral_codes.values().any(|c| c.code == code.code)
        {
            return Err(GorillionaireError::Conflict(format!(
                "referral code {} already taken",
                code.code
            )));
        }
        state
            .referral_codes
            .insert(code.user_address.clone(), code.clone());
        Ok(())
    }

    async fn referral_code_owner(&self, code: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .referral_codes
            .values()
            .find(|c| c.code == code)
            .map(|c| c.user_address.clone()))
    }

    async fn insert_referral(&self, referral: &Referral) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .referrals
            .iter()
            .any(|r| r.referee_address == referral.referee_address)
        {
            return Err(GorillionaireError::Conflict(format!(
                "{} was already referred",
                referral.referee_address
            )));
        }
        state.referrals.push(referral.clone());
        Ok(())
    }

    async fn referred_by(&self, user_address: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .referrals
            .iter()
            .find(|r| r.referee_address == user_address)
            .map(|r| r.referrer_address.clone()))
    }

    async fn referral_count(&self, user_address: &str) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .referrals
            .iter()
            .filter(|r| r.referrer_address == user_address)
            .count() as i64)
    }

    async fn get_access(&self, address: &str) -> Result<Option<AccessRecord>> {
        Ok(self.state.read().await.access.get(address).cloned())
    }

    async fn set_access(&self, address: &str, has_v2_access: bool) -> Result<AccessRecord> {
        let record = AccessRecord {
            address: address.to_string(),
            has_v2_access,
            updated_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .access
            .insert(address.to_string(), record.clone());
        Ok(record)
    }

    async fn link_social(&self, account: &SocialAccount) -> Result<()> {
        let mut state = self.state.write().await;
        if state.social.iter().any(|s| {
            s.provider == account.provider
                && s.external_id == account.external_id
                && s.user_address != account.user_address
        }) {
            return Err(GorillionaireError::Conflict(format!(
                "{} account {} is linked to another wallet",
                account.provider, account.external_id
            )));
        }
        state
            .social
            .retain(|s| !(s.user_address == account.user_address && s.provider == account.provider));
        state.social.push(account.clone());
        Ok(())
    }

    async fn social_accounts(&self, user_address: &str) -> Result<Vec<SocialAccount>> {
        let state = self.state.read().await;
        let mut out: Vec<_> = state
            .social
            .iter()
            .filter(|s| s.user_address == user_address)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.provider.as_str());
        Ok(out)
    }

    async fn insert_snapshot(&self, snapshot: &HolderSnapshot) -> Result<()> {
        self.state.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self, token_address: &str) -> Result<Option<HolderSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| s.token_address == token_address)
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn insert_spike(&self, spike: &Spike) -> Result<()> {
        self.state.write().await.spikes.push(spike.clone());
        Ok(())
    }

    async fn recent_spikes(&self, limit: i64, token_address: Option<&str>) -> Result<Vec<Spike>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .spikes
                .iter()
                .filter(|s| token_address.map_or(true, |t| s.token_address == t))
                .cloned(),
            |s| s.detected_at,
            limit,
        ))
    }

    async fn insert_prices(&self, prices: &[PricePoint]) -> Result<()> {
        self.state.write().await.prices.extend_from_slice(prices);
        Ok(())
    }

    async fn latest_prices(&self) -> Result<Vec<PricePoint>> {
        let state = self.state.read().await;
        let mut latest: HashMap<&str, &PricePoint> = HashMap::new();
        for point in &state.prices {
            match latest.get(point.symbol.as_str()) {
                Some(existing) if existing.captured_at >= point.captured_at => {}
                _ => {
                    latest.insert(point.symbol.as_str(), point);
                }
            }
        }
        let mut out: Vec<PricePoint> = latest.into_values().cloned().collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }
}
