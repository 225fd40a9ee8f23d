use axum::{
    extract::State,
    Json,
};

use crate::api::{error::ApiResult, extract::ApiQuery, state::AppState, types::*};
use crate::domain::Spike;

/// GET /api/spikes
pub async fn list_spikes(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SpikesQuery>,
) -> ApiResult<Json<Vec<Spike>>> {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let token = query
        .token
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());

    Ok(Json(state.store.recent_spikes(limit, token.as_deref()).await?))
}
