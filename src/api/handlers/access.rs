use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use tracing::info;

use super::parse_address;
use crate::api::{error::ApiResult, extract::{ApiJson, ApiPath}, state::AppState, types::*};

/// GET /api/access/v2/:address
pub async fn get_v2_access(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<AccessResponse>> {
    let address = parse_address(&address)?;
    let record = state.store.get_access(&address).await?;

    Ok(Json(AccessResponse {
        has_access: record.as_ref().is_some_and(|r| r.has_v2_access),
        updated_at: record.map(|r| r.updated_at),
        address,
    }))
}

/// PUT /api/access/v2/:address (admin)
pub async fn set_v2_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(address): ApiPath<String>,
    ApiJson(req): ApiJson<SetAccessRequest>,
) -> ApiResult<Json<AccessResponse>> {
    state.admin.ensure_authorized(&headers)?;
    let address = parse_address(&address)?;

    let record = state.store.set_access(&address, req.has_access).await?;
    info!("V2 access for {} set to {}", address, record.has_v2_access);

    Ok(Json(AccessResponse {
        address: record.address,
        has_access: record.has_v2_access,
        updated_at: Some(record.updated_at),
    }))
}
