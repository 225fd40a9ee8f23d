use axum::{
    extract::State,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::parse_address;
use crate::adapters::OAuthProvider;
use crate::api::{
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery},
    state::AppState,
    types::*,
};
use crate::domain::{ActivityEvent, ActivityKind, SocialAccount, SocialProvider};
use crate::error::GorillionaireError;

fn parse_provider(raw: &str) -> ApiResult<SocialProvider> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("unknown provider: {}", raw)))
}

fn client_for(state: &AppState, provider: SocialProvider) -> ApiResult<Arc<dyn OAuthProvider>> {
    state.oauth.get(&provider).cloned().ok_or_else(|| {
        GorillionaireError::NotConfigured(format!("{} OAuth is not configured", provider)).into()
    })
}

/// GET /api/social/:provider/authorize?address=
pub async fn authorize(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ApiQuery(query): ApiQuery<AuthorizeQuery>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let provider = parse_provider(&provider)?;
    let address = parse_address(query.address.as_deref().unwrap_or_default())?;
    let client = client_for(&state, provider)?;

    let (oauth_state, code_verifier) = state.oauth_states.issue(provider, &address);
    let url = client.authorize_url(&oauth_state, &code_verifier)?;

    Ok(Json(AuthorizeResponse {
        url,
        state: oauth_state,
    }))
}

/// GET /api/social/:provider/callback?code=&state=
///
/// The state is consumed before anything else so it cannot be replayed, and
/// the provider is only contacted once the state checks out.
pub async fn callback(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> ApiResult<Json<SocialLinkResponse>> {
    let provider = parse_provider(&provider)?;
    let oauth_state = query
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing state"))?;

    let pending = state.oauth_states.consume(provider, oauth_state)?;

    if let Some(error) = query.error {
        return Err(ApiError::bad_request(format!(
            "{} authorization denied: {}",
            provider, error
        )));
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing code"))?;

    let client = client_for(&state, provider)?;
    let profile = client.exchange(code, &pending.code_verifier).await?;

    let already_linked = state
        .store
        .social_accounts(&pending.user_address)
        .await?
        .iter()
        .any(|a| a.provider == provider);

    let account = SocialAccount {
        user_address: pending.user_address.clone(),
        provider,
        external_id: profile.external_id,
        username: profile.username,
        linked_at: Utc::now(),
    };
    state.store.link_social(&account).await?;

    // Relinking refreshes the username but earns nothing
    let mut points_awarded = 0;
    if !already_linked {
        let event = ActivityEvent::new(
            &account.user_address,
            ActivityKind::SocialLink,
            serde_json::json!({ "provider": provider, "username": account.username }),
        );
        state.store.insert_activity(&event).await?;
        points_awarded = event.points;
    }
    let badges_awarded = state.badges.evaluate(&account.user_address).await?;

    info!(
        "Linked {} account {} to {}",
        provider, account.username, account.user_address
    );
    Ok(Json(SocialLinkResponse {
        account,
        points_awarded,
        badges_awarded,
    }))
}

/// GET /api/social/:address/accounts
pub async fn get_social_accounts(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<SocialAccount>>> {
    let address = parse_address(&address)?;
    Ok(Json(state.store.social_accounts(&address).await?))
}
