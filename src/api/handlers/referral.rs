use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use super::parse_address;
use crate::api::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    state::AppState,
    types::*,
};
use crate::domain::{
    generate_referral_code, normalize_referral_code, ActivityEvent, ActivityKind, Referral,
    ReferralCode,
};
use crate::error::GorillionaireError;

const CODE_ATTEMPTS: usize = 5;

/// POST /api/referral/code: return the caller's code, creating it on first use
pub async fn create_referral_code(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ReferralCodeRequest>,
) -> ApiResult<Json<ReferralCodeResponse>> {
    let address = parse_address(&req.address)?;

    if let Some(existing) = state.store.referral_code(&address).await? {
        return Ok(Json(ReferralCodeResponse {
            address,
            code: existing.code,
        }));
    }

    for _ in 0..CODE_ATTEMPTS {
        let code = ReferralCode {
            user_address: address.clone(),
            code: generate_referral_code(),
            created_at: Utc::now(),
        };
        match state.store.insert_referral_code(&code).await {
            Ok(()) => {
                info!("Referral code {} created for {}", code.code, address);
                return Ok(Json(ReferralCodeResponse {
                    address,
                    code: code.code,
                }));
            }
            Err(GorillionaireError::Conflict(_)) => {
                // Either a code collision or a concurrent request for the same user
                if let Some(existing) = state.store.referral_code(&address).await? {
                    return Ok(Json(ReferralCodeResponse {
                        address,
                        code: existing.code,
                    }));
                }
                warn!("Referral code collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(GorillionaireError::Internal("could not allocate a unique referral code".into()).into())
}

/// POST /api/referral/redeem
pub async fn redeem_referral(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RedeemRequest>,
) -> ApiResult<(StatusCode, Json<RedeemResponse>)> {
    let referee = parse_address(&req.address)?;
    let code = normalize_referral_code(&req.code)
        .ok_or_else(|| ApiError::bad_request("invalid referral code"))?;

    let referrer = state
        .store
        .referral_code_owner(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("referral code not found"))?;

    if referrer == referee {
        return Err(ApiError::bad_request("cannot redeem your own referral code"));
    }
    if state.store.referred_by(&referee).await?.is_some() {
        return Err(GorillionaireError::Conflict(format!("{} was already referred", referee)).into());
    }

    state
        .store
        .insert_referral(&Referral {
            referrer_address: referrer.clone(),
            referee_address: referee.clone(),
            created_at: Utc::now(),
        })
        .await?;

    state
        .store
        .insert_activity(&ActivityEvent::new(
            &referrer,
            ActivityKind::Referral,
            serde_json::json!({ "referee": referee }),
        ))
        .await?;
    state.badges.evaluate(&referrer).await?;

    info!("Referral: {} referred {}", referrer, referee);
    Ok((
        StatusCode::CREATED,
        Json(RedeemResponse { referrer, referee }),
    ))
}

/// GET /api/referral/:address
pub async fn get_referral_summary(
    State(state): State<AppState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<ReferralSummary>> {
    let address = parse_address(&address)?;
    let code = state.store.referral_code(&address).await?.map(|c| c.code);
    let referred_by = state.store.referred_by(&address).await?;
    let referrals = state.store.referral_count(&address).await?;

    Ok(Json(ReferralSummary {
        address,
        code,
        referred_by,
        referrals,
    }))
}
