use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::parse_address;
use crate::api::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    types::*,
};
use crate::domain::{ActivityEvent, ActivityKind, SignalChoice, TradingSignal, UserSignal};

/// GET /api/signals
pub async fn list_signals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SignalsQuery>,
) -> ApiResult<Json<Vec<TradingSignal>>> {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let symbol = query
        .symbol
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty());

    Ok(Json(
        state.store.latest_signals(limit, symbol.as_deref()).await?,
    ))
}

/// GET /api/signals/:id
pub async fn get_signal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TradingSignal>> {
    state
        .store
        .get_signal(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("signal {} not found", id)))
}

/// POST /api/signals/:id/respond
pub async fn respond_to_signal(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RespondRequest>,
) -> ApiResult<(StatusCode, Json<RespondResponse>)> {
    let address = parse_address(&req.user_address)?;
    let choice: SignalChoice = req.choice.parse().map_err(ApiError::bad_request)?;

    if state.store.get_signal(id).await?.is_none() {
        return Err(ApiError::not_found(format!("signal {} not found", id)));
    }

    // A second answer to the same signal surfaces as Conflict (409)
    let response = UserSignal::new(&address, id, choice);
    state.store.insert_user_signal(&response).await?;

    let event = ActivityEvent::new(
        &address,
        ActivityKind::SignalResponse,
        serde_json::json!({ "signal_id": id, "choice": choice }),
    );
    state.store.insert_activity(&event).await?;
    let badges_awarded = state.badges.evaluate(&address).await?;

    Ok((
        StatusCode::CREATED,
        Json(RespondResponse {
            response,
            points_awarded: event.points,
            badges_awarded,
        }),
    ))
}

/// GET /api/signals/user/:address
pub async fn get_user_signals(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<UserSignal>>> {
    let address = parse_address(&address)?;
    Ok(Json(state.store.user_signals(&address).await?))
}
