//! Badge awarding
//!
//! Badges are evaluated after every activity that can move a user's progress
//! (trades, accepted signals, referrals, social links). Awards are idempotent:
//! a user who already holds a badge is skipped silently.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::adapters::Store;
use crate::domain::{default_badges, ActivityEvent, ActivityKind, Badge, UserBadge};
use crate::error::Result;

pub struct BadgeAwarder {
    store: Arc<dyn Store>,
}

impl BadgeAwarder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert the default catalogue when no badge exists yet.
    /// Returns the number of badges inserted.
    pub async fn seed_defaults(&self) -> Result<usize> {
        if !self.store.list_badges().await?.is_empty() {
            return Ok(0);
        }

        let defaults = default_badges();
        for badge in &defaults {
            self.store.insert_badge(badge).await?;
        }
        info!("Seeded {} default badges", defaults.len());
        Ok(defaults.len())
    }

    /// Award every badge whose criterion the user now meets.
    /// Returns the badges newly awarded by this call.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, user_address: &str) -> Result<Vec<Badge>> {
        let progress = self.store.user_progress(user_address).await?;
        let held: Vec<_> = self
            .store
            .user_badges(user_address)
            .await?
            .into_iter()
            .map(|b| b.badge_id)
            .collect();

        let mut awarded = Vec::new();
        for badge in self.store.list_badges().await? {
            if held.contains(&badge.id) || !badge.criterion.is_met(&progress) {
                continue;
            }

            if !self
                .store
                .award_badge(&UserBadge::new(user_address, badge.id))
                .await?
            {
                // Raced with a concurrent evaluation
                continue;
            }

            let event = ActivityEvent::new(
                user_address,
                ActivityKind::BadgeAwarded,
                serde_json::json!({ "badge_id": badge.id, "slug": badge.slug }),
            );
            self.store.insert_activity(&event).await?;

            info!("Awarded badge {} to {}", badge.slug, user_address);
            awarded.push(badge);
        }

        if awarded.is_empty() {
            debug!(?progress, "No new badges");
        }
        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::{SignalAction, TradeNotification};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    const ALICE: &str = "0x00000000000000000000000000000000000000a1";

    async fn record_trade(store: &MemoryStore, user: &str) {
        let trade = TradeNotification {
            id: Uuid::new_v4(),
            user_address: user.to_string(),
            symbol: "MON".to_string(),
            side: SignalAction::Buy,
            amount: dec!(10),
            price_usd: Some(dec!(1.5)),
            tx_hash: None,
            signal_id: None,
            created_at: Utc::now(),
        };
        store.insert_trade(&trade).await.unwrap();
        store
            .insert_activity(&ActivityEvent::new(user, ActivityKind::Trade, serde_json::json!({})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let store = Arc::new(MemoryStore::new());
        let awarder = BadgeAwarder::new(store.clone());

        let seeded = awarder.seed_defaults().await.unwrap();
        assert_eq!(seeded, default_badges().len());
        assert_eq!(awarder.seed_defaults().await.unwrap(), 0);
        assert_eq!(store.list_badges().await.unwrap().len(), seeded);
    }

    #[tokio::test]
    async fn test_first_trade_badge_awarded_once() {
        let store = Arc::new(MemoryStore::new());
        let awarder = BadgeAwarder::new(store.clone());
        awarder.seed_defaults().await.unwrap();

        assert!(awarder.evaluate(ALICE).await.unwrap().is_empty());

        record_trade(&store, ALICE).await;
        let awarded = awarder.evaluate(ALICE).await.unwrap();
        assert_eq!(awarded.len(), 1);
        assert_eq!(awarded[0].slug, "first-trade");

        record_trade(&store, ALICE).await;
        assert!(awarder.evaluate(ALICE).await.unwrap().is_empty());
        assert_eq!(store.user_badges(ALICE).await.unwrap().len(), 1);

        let feed = store.recent_activity(ALICE, 10).await.unwrap();
        assert!(feed.iter().any(|e| e.kind == ActivityKind::BadgeAwarded));
    }
}
