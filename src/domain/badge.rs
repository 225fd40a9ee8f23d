use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rule that decides when a badge is earned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "threshold", rename_all = "snake_case")]
pub enum BadgeCriterion {
    SignalsAccepted(u32),
    Referrals(u32),
    Trades(u32),
    SocialLinked,
}

/// Per-user counters a criterion is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserProgress {
    pub signals_accepted: u32,
    pub referrals: u32,
    pub trades: u32,
    pub social_accounts: u32,
}

impl BadgeCriterion {
    pub fn is_met(&self, progress: &UserProgress) -> bool {
        match *self {
            Self::SignalsAccepted(n) => progress.signals_accepted >= n,
            Self::Referrals(n) => progress.referrals >= n,
            Self::Trades(n) => progress.trades >= n,
            Self::SocialLinked => progress.social_accounts > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub criterion: BadgeCriterion,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBadge {
    pub id: Uuid,
    pub user_address: String,
    pub badge_id: Uuid,
    pub awarded_at: DateTime<Utc>,
}

impl UserBadge {
    pub fn new(user_address: &str, badge_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_address: user_address.to_string(),
            badge_id,
            awarded_at: Utc::now(),
        }
    }
}

/// Badges seeded on first start when the catalogue is empty
pub fn default_badges() -> Vec<Badge> {
    let now = Utc::now();
    let badge = |slug: &str, name: &str, description: &str, criterion| Badge {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        image_url: None,
        criterion,
        created_at: now,
    };

    vec![
        badge(
            "first-signal",
            "First Signal",
            "Accepted your first trading signal",
            BadgeCriterion::SignalsAccepted(1),
        ),
        badge(
            "signal-veteran",
            "Signal Veteran",
            "Accepted 25 trading signals",
            BadgeCriterion::SignalsAccepted(25),
        ),
        badge(
            "first-trade",
            "First Trade",
            "Executed a trade through the platform",
            BadgeCriterion::Trades(1),
        ),
        badge(
            "recruiter",
            "Recruiter",
            "Referred 5 users",
            BadgeCriterion::Referrals(5),
        ),
        badge(
            "socialite",
            "Socialite",
            "Linked a Discord or Twitter account",
            BadgeCriterion::SocialLinked,
        ),
    ]
}
