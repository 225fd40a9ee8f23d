use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::parse_address;
use crate::api::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    types::*,
};
use crate::domain::{
    ActivityEvent, ActivityKind, LeaderboardEntry, SignalAction, TradeNotification, WsMessage,
};

/// GET /api/activity/:address
pub async fn get_activity(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<ActivityEvent>>> {
    let address = parse_address(&address)?;
    let limit = clamp_limit(query.limit, DEFAULT_ACTIVITY_LIMIT, MAX_ACTIVITY_LIMIT);
    Ok(Json(state.store.recent_activity(&address, limit).await?))
}

/// POST /api/activity (admin)
///
/// Manual grants and corrections; the user-facing routes record the same
/// kinds under their own rules.
pub async fn record_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<RecordActivityRequest>,
) -> ApiResult<(StatusCode, Json<ActivityEvent>)> {
    state.admin.ensure_authorized(&headers)?;
    let address = parse_address(&req.user_address)?;
    let kind: ActivityKind = req.kind.parse().map_err(ApiError::bad_request)?;
    if kind == ActivityKind::BadgeAwarded {
        return Err(ApiError::bad_request(
            "badge_awarded events are recorded by the badge evaluator",
        ));
    }

    let event = ActivityEvent::new(
        &address,
        kind,
        req.details.unwrap_or_else(|| serde_json::json!({})),
    );
    state.store.insert_activity(&event).await?;
    state.badges.evaluate(&address).await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/activity/:address/points
pub async fn get_points(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<PointsResponse>> {
    let address = parse_address(&address)?;
    let points = state.store.total_points(&address).await?;
    Ok(Json(PointsResponse { address, points }))
}

/// GET /api/leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    Ok(Json(state.store.leaderboard(limit).await?))
}

/// POST /api/trades
///
/// Records the trade, grants trade points, re-evaluates badges and pushes a
/// `trade` message to WebSocket subscribers.
pub async fn record_trade(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TradeRequest>,
) -> ApiResult<(StatusCode, Json<TradeResponse>)> {
    let address = parse_address(&req.user_address)?;

    let symbol = req.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::bad_request("symbol is required"));
    }
    let side: SignalAction = req.side.parse().map_err(ApiError::bad_request)?;
    if req.amount <= Decimal::ZERO {
        return Err(ApiError::bad_request("amount must be positive"));
    }
    if req.price_usd.is_some_and(|p| p <= Decimal::ZERO) {
        return Err(ApiError::bad_request("price_usd must be positive"));
    }
    if let Some(signal_id) = req.signal_id {
        if state.store.get_signal(signal_id).await?.is_none() {
            return Err(ApiError::bad_request(format!("unknown signal {}", signal_id)));
        }
    }

    let trade = TradeNotification {
        id: Uuid::new_v4(),
        user_address: address.clone(),
        symbol,
        side,
        amount: req.amount,
        price_usd: req.price_usd,
        tx_hash: req.tx_hash.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()),
        signal_id: req.signal_id,
        created_at: Utc::now(),
    };
    state.store.insert_trade(&trade).await?;

    let event = ActivityEvent::new(
        &address,
        ActivityKind::Trade,
        serde_json::json!({
            "trade_id": trade.id,
            "symbol": trade.symbol,
            "side": trade.side,
            "amount": trade.amount,
        }),
    );
    state.store.insert_activity(&event).await?;
    let badges_awarded = state.badges.evaluate(&address).await?;

    info!(
        "Trade recorded: {} {} {} by {}",
        trade.side, trade.amount, trade.symbol, address
    );
    state.broadcast(WsMessage::Trade(trade.clone()));

    Ok((
        StatusCode::CREATED,
        Json(TradeResponse {
            trade,
            points_awarded: event.points,
            badges_awarded,
        }),
    ))
}
