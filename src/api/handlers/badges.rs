use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::parse_address;
use crate::api::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    state::AppState,
    types::*,
};
use crate::domain::Badge;

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// GET /api/badges
pub async fn list_badges(State(state): State<AppState>) -> ApiResult<Json<Vec<Badge>>> {
    Ok(Json(state.store.list_badges().await?))
}

/// POST /api/badges (admin)
pub async fn create_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateBadgeRequest>,
) -> ApiResult<(StatusCode, Json<Badge>)> {
    state.admin.ensure_authorized(&headers)?;

    let slug = req.slug.trim().to_string();
    if !valid_slug(&slug) {
        return Err(ApiError::bad_request(
            "slug must be 1-64 characters of a-z, 0-9 and '-'",
        ));
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let badge = Badge {
        id: Uuid::new_v4(),
        slug,
        name,
        description: req.description.trim().to_string(),
        image_url: req.image_url.filter(|u| !u.trim().is_empty()),
        criterion: req.criterion,
        created_at: Utc::now(),
    };
    state.store.insert_badge(&badge).await?;

    info!("Badge {} created", badge.slug);
    Ok((StatusCode::CREATED, Json(badge)))
}

/// GET /api/badges/:address
pub async fn get_user_badges(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<EarnedBadge>>> {
    let address = parse_address(&address)?;

    let catalogue: HashMap<Uuid, Badge> = state
        .store
        .list_badges()
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    let earned = state
        .store
        .user_badges(&address)
        .await?
        .into_iter()
        .filter_map(|ub| {
            catalogue.get(&ub.badge_id).map(|badge| EarnedBadge {
                badge: badge.clone(),
                awarded_at: ub.awarded_at,
            })
        })
        .collect();

    Ok(Json(earned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slug() {
        assert!(valid_slug("first-trade"));
        assert!(valid_slug("top10"));
        assert!(!valid_slug(""));
        assert!(!valid_slug("First Trade"));
        assert!(!valid_slug(&"a".repeat(65)));
    }
}
