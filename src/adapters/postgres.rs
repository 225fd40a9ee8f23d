use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::Store;
use crate::domain::{
    AccessRecord, ActivityEvent, ActivityKind, Badge, BadgeCriterion, HolderSnapshot,
    LeaderboardEntry, PricePoint, Referral, ReferralCode, SignalAction, SignalChoice,
    SocialAccount, SocialProvider, Spike, TradeNotification, TradingSignal, UserBadge,
    UserProgress, UserSignal,
};
use crate::error::{GorillionaireError, Result};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Turn a unique-constraint violation into `Conflict`, pass anything else through
fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> GorillionaireError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            GorillionaireError::Conflict(message())
        }
        _ => GorillionaireError::Database(err),
    }
}

/// Progress counters come back as BIGINT; anything outside `u32` is a bad row
fn progress_count(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        GorillionaireError::Internal(format!("progress column {} out of range: {}", column, value))
    })
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(GorillionaireError::Internal)
}

fn badge_from_row(r: &PgRow) -> Result<Badge> {
    let criterion: serde_json::Value = r.try_get("criterion")?;
    Ok(Badge {
        id: r.try_get("id")?,
        slug: r.try_get("slug")?,
        name: r.try_get("name")?,
        description: r.try_get("description")?,
        image_url: r.try_get("image_url")?,
        criterion: serde_json::from_value::<BadgeCriterion>(criterion)?,
        created_at: r.try_get("created_at")?,
    })
}

fn signal_from_row(r: &PgRow) -> Result<TradingSignal> {
    Ok(TradingSignal {
        id: r.try_get("id")?,
        symbol: r.try_get("symbol")?,
        action: parse_column::<SignalAction>(r, "action")?,
        confidence: r.try_get("confidence")?,
        reasoning: r.try_get("reasoning")?,
        price_usd: r.try_get("price_usd")?,
        created_at: r.try_get("created_at")?,
    })
}

fn spike_from_row(r: &PgRow) -> Result<Spike> {
    Ok(Spike {
        id: r.try_get("id")?,
        token_address: r.try_get("token_address")?,
        token_symbol: r.try_get("token_symbol")?,
        window_secs: r.try_get("window_secs")?,
        previous_count: r.try_get("previous_count")?,
        current_count: r.try_get("current_count")?,
        change_pct: r.try_get("change_pct")?,
        detected_at: r.try_get("detected_at")?,
    })
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Badges ====================

    async fn list_badges(&self) -> Result<Vec<Badge>> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, name, description, image_url, criterion, created_at
            FROM badges ORDER BY slug
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(badge_from_row).collect()
    }

    #[instrument(skip(self, badge), fields(slug = %badge.slug))]
    async fn insert_badge(&self, badge: &Badge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO badges (id, slug, name, description, image_url, criterion, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(badge.id)
        .bind(&badge.slug)
        .bind(&badge.name)
        .bind(&badge.description)
        .bind(&badge.image_url)
        .bind(serde_json::to_value(badge.criterion)?)
        .bind(badge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("badge {} already exists", badge.slug)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn award_badge(&self, award: &UserBadge) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badges (id, user_address, badge_id, awarded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_address, badge_id) DO NOTHING
            "#,
        )
        .bind(award.id)
        .bind(&award.user_address)
        .bind(award.badge_id)
        .bind(award.awarded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn user_badges(&self, user_address: &str) -> Result<Vec<UserBadge>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_address, badge_id, awarded_at
            FROM user_badges WHERE user_address = $1
            ORDER BY awarded_at
            "#,
        )
        .bind(user_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| UserBadge {
                id: r.get("id"),
                user_address: r.get("user_address"),
                badge_id: r.get("badge_id"),
                awarded_at: r.get("awarded_at"),
            })
            .collect())
    }

    // ==================== Signals ====================

    #[instrument(skip(self, signal), fields(symbol = %signal.symbol, action = %signal.action))]
    async fn insert_signal(&self, signal: &TradingSignal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_signals (id, symbol, action, confidence, reasoning, price_usd, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(signal.id)
        .bind(&signal.symbol)
        .bind(signal.action.as_str())
        .bind(signal.confidence)
        .bind(&signal.reasoning)
        .bind(signal.price_usd)
        .bind(signal.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<TradingSignal>> {
        let row = sqlx::query(
            r#"
            SELECT id, symbol, action, confidence, reasoning, price_usd, created_at
            FROM trading_signals WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(signal_from_row).transpose()
    }

    async fn latest_signals(
        &self,
        limit: i64,
        symbol: Option<&str>,
    ) -> Result<Vec<TradingSignal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, action, confidence, reasoning, price_usd, created_at
            FROM trading_signals
            WHERE ($1::TEXT IS NULL OR UPPER(symbol) = UPPER($1))
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn insert_user_signal(&self, response: &UserSignal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_signals (id, user_address, signal_id, choice, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(response.id)
        .bind(&response.user_address)
        .bind(response.signal_id)
        .bind(response.choice.as_str())
        .bind(response.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "{} already responded to signal {}",
                    response.user_address, response.signal_id
                )
            })
        })?;
        Ok(())
    }

    async fn user_signals(&self, user_address: &str) -> Result<Vec<UserSignal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_address, signal_id, choice, created_at
            FROM user_signals WHERE user_address = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_address)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(UserSignal {
                    id: r.try_get("id")?,
                    user_address: r.try_get("user_address")?,
                    signal_id: r.try_get("signal_id")?,
                    choice: parse_column::<SignalChoice>(r, "choice")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    // ==================== Activity ====================

    async fn insert_activity(&self, event: &ActivityEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_events (id, user_address, kind, points, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.user_address)
        .bind(event.kind.as_str())
        .bind(event.points)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_activity(
        &self,
        user_address: &str,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_address, kind, points, details, created_at
            FROM activity_events WHERE user_address = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(ActivityEvent {
                    id: r.try_get("id")?,
                    user_address: r.try_get("user_address")?,
                    kind: parse_column::<ActivityKind>(r, "kind")?,
                    points: r.try_get("points")?,
                    details: r.try_get("details")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn total_points(&self, user_address: &str) -> Result<i64> {
        let points: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(points), 0)::BIGINT
            FROM activity_events WHERE user_address = $1
            "#,
        )
        .bind(user_address)
        .fetch_one(&self.pool)
        .await?;
        Ok(points)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT user_address,
                   COALESCE(SUM(points), 0)::BIGINT as points,
                   COUNT(*)::BIGINT as events
            FROM activity_events
            GROUP BY user_address
            ORDER BY points DESC, user_address ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| LeaderboardEntry {
                user_address: r.get("user_address"),
                points: r.get("points"),
                events: r.get("events"),
            })
            .collect())
    }

    async fn user_progress(&self, user_address: &str) -> Result<UserProgress> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM user_signals
                    WHERE user_address = $1 AND choice = 'accept')::BIGINT as signals_accepted,
                (SELECT COUNT(*) FROM referrals
                    WHERE referrer_address = $1)::BIGINT as referrals,
                (SELECT COUNT(*) FROM trades
                    WHERE user_address = $1)::BIGINT as trades,
                (SELECT COUNT(*) FROM social_accounts
                    WHERE user_address = $1)::BIGINT as social_accounts
            "#,
        )
        .bind(user_address)
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u32> { progress_count(column, row.try_get(column)?) };
        Ok(UserProgress {
            signals_accepted: count("signals_accepted")?,
            referrals: count("referrals")?,
            trades: count("trades")?,
            social_accounts: count("social_accounts")?,
        })
    }

    #[instrument(skip(self, trade), fields(user = %trade.user_address, symbol = %trade.symbol))]
    async fn insert_trade(&self, trade: &TradeNotification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (id, user_address, symbol, side, amount, price_usd, tx_hash, signal_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trade.id)
        .bind(&trade.user_address)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.amount)
        .bind(trade.price_usd)
        .bind(&trade.tx_hash)
        .bind(trade.signal_id)
        .bind(trade.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Referrals ====================

    async fn referral_code(&self, user_address: &str) -> Result<Option<ReferralCode>> {
        let row = sqlx::query(
            "SELECT user_address, code, created_at FROM referral_codes WHERE user_address = $1",
        )
        .bind(user_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ReferralCode {
            user_address: r.get("user_address"),
            code: r.get("code"),
            created_at: r.get("created_at"),
        }))
    }

    async fn insert_referral_code(&self, code: &ReferralCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO referral_codes (user_address, code, created_at) VALUES ($1, $2, $3)",
        )
        .bind(&code.user_address)
        .bind(&code.code)
        .bind(code.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("referral code {} already taken", code.code)))?;
        Ok(())
    }

    async fn referral_code_owner(&self, code: &str) -> Result<Option<String>> {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT user_address FROM referral_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }

    #[instrument(skip(self))]
    async fn insert_referral(&self, referral: &Referral) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO referrals (referee_address, referrer_address, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&referral.referee_address)
        .bind(&referral.referrer_address)
        .bind(referral.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("{} was already referred", referral.referee_address))
        })?;
        Ok(())
    }

    async fn referred_by(&self, user_address: &str) -> Result<Option<String>> {
        let referrer = sqlx::query_scalar::<_, String>(
            "SELECT referrer_address FROM referrals WHERE referee_address = $1",
        )
        .bind(user_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(referrer)
    }

    async fn referral_count(&self, user_address: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM referrals WHERE referrer_address = $1",
        )
        .bind(user_address)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ==================== Access ====================

    async fn get_access(&self, address: &str) -> Result<Option<AccessRecord>> {
        let row = sqlx::query(
            "SELECT address, has_v2_access, updated_at FROM v2_access WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AccessRecord {
            address: r.get("address"),
            has_v2_access: r.get("has_v2_access"),
            updated_at: r.get("updated_at"),
        }))
    }

    #[instrument(skip(self))]
    async fn set_access(&self, address: &str, has_v2_access: bool) -> Result<AccessRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO v2_access (address, has_v2_access, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (address) DO UPDATE SET
                has_v2_access = EXCLUDED.has_v2_access,
                updated_at = EXCLUDED.updated_at
            RETURNING address, has_v2_access, updated_at
            "#,
        )
        .bind(address)
        .bind(has_v2_access)
        .fetch_one(&self.pool)
        .await?;

        Ok(AccessRecord {
            address: row.get("address"),
            has_v2_access: row.get("has_v2_access"),
            updated_at: row.get("updated_at"),
        })
    }

    // ==================== Social ====================

    #[instrument(skip(self, account), fields(user = %account.user_address, provider = %account.provider))]
    async fn link_social(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (user_address, provider, external_id, username, linked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_address, provider) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                username = EXCLUDED.username,
                linked_at = EXCLUDED.linked_at
            "#,
        )
        .bind(&account.user_address)
        .bind(account.provider.as_str())
        .bind(&account.external_id)
        .bind(&account.username)
        .bind(account.linked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "{} account {} is linked to another wallet",
                    account.provider, account.external_id
                )
            })
        })?;
        Ok(())
    }

    async fn social_accounts(&self, user_address: &str) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT user_address, provider, external_id, username, linked_at
            FROM social_accounts WHERE user_address = $1
            ORDER BY provider
            "#,
        )
        .bind(user_address)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(SocialAccount {
                    user_address: r.try_get("user_address")?,
                    provider: parse_column::<SocialProvider>(r, "provider")?,
                    external_id: r.try_get("external_id")?,
                    username: r.try_get("username")?,
                    linked_at: r.try_get("linked_at")?,
                })
            })
            .collect()
    }

    // ==================== Market data ====================

    async fn insert_snapshot(&self, snapshot: &HolderSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO holder_snapshots (token_address, token_symbol, holder_count, transfer_count, captured_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&snapshot.token_address)
        .bind(&snapshot.token_symbol)
        .bind(snapshot.holder_count)
        .bind(snapshot.transfer_count)
        .bind(snapshot.captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_snapshot(&self, token_address: &str) -> Result<Option<HolderSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT token_address, token_symbol, holder_count, transfer_count, captured_at
            FROM holder_snapshots WHERE token_address = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(token_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| HolderSnapshot {
            token_address: r.get("token_address"),
            token_symbol: r.get("token_symbol"),
            holder_count: r.get("holder_count"),
            transfer_count: r.get("transfer_count"),
            captured_at: r.get("captured_at"),
        }))
    }

    #[instrument(skip(self, spike), fields(token = %spike.token_symbol, change_pct = spike.change_pct))]
    async fn insert_spike(&self, spike: &Spike) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO spikes (id, token_address, token_symbol, window_secs, previous_count, current_count, change_pct, detected_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(spike.id)
        .bind(&spike.token_address)
        .bind(&spike.token_symbol)
        .bind(spike.window_secs)
        .bind(spike.previous_count)
        .bind(spike.current_count)
        .bind(spike.change_pct)
        .bind(spike.detected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_spikes(&self, limit: i64, token_address: Option<&str>) -> Result<Vec<Spike>> {
        let rows = sqlx::query(
            r#"
            SELECT id, token_address, token_symbol, window_secs, previous_count, current_count, change_pct, detected_at
            FROM spikes
            WHERE ($1::TEXT IS NULL OR token_address = $1)
            ORDER BY detected_at DESC
            LIMIT $2
            "#,
        )
        .bind(token_address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(spike_from_row).collect()
    }

    async fn insert_prices(&self, prices: &[PricePoint]) -> Result<()> {
        if prices.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for point in prices {
            sqlx::query(
                "INSERT INTO price_points (symbol, price_usd, captured_at) VALUES ($1, $2, $3)",
            )
            .bind(&point.symbol)
            .bind(point.price_usd)
            .bind(point.captured_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn latest_prices(&self) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (symbol) symbol, price_usd, captured_at
            FROM price_points
            ORDER BY symbol, captured_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| PricePoint {
                symbol: r.get("symbol"),
                price_usd: r.get("price_usd"),
                captured_at: r.get("captured_at"),
            })
            .collect())
    }
}
