use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::{handlers, sse::signal_stream, state::AppState, websocket::websocket_handler};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/api/system/jobs", get(handlers::get_jobs))
        // Activity endpoints
        .route("/api/activity", post(handlers::record_activity))
        .route("/api/activity/:address", get(handlers::get_activity))
        .route("/api/activity/:address/points", get(handlers::get_points))
        .route("/api/leaderboard", get(handlers::get_leaderboard))
        .route("/api/trades", post(handlers::record_trade))
        // Signal endpoints
        .route("/api/signals", get(handlers::list_signals))
        .route("/api/signals/stream", get(signal_stream))
        .route("/api/signals/user/:address", get(handlers::get_user_signals))
        .route("/api/signals/:id", get(handlers::get_signal))
        .route("/api/signals/:id/respond", post(handlers::respond_to_signal))
        // Referral endpoints
        .route("/api/referral/code", post(handlers::create_referral_code))
        .route("/api/referral/redeem", post(handlers::redeem_referral))
        .route("/api/referral/:address", get(handlers::get_referral_summary))
        // Access endpoints
        .route(
            "/api/access/v2/:address",
            get(handlers::get_v2_access).put(handlers::set_v2_access),
        )
        // Social endpoints; the router needs one parameter name per segment,
        // so `:key` is a provider for the OAuth routes and an address for accounts
        .route("/api/social/:key/authorize", get(handlers::authorize))
        .route("/api/social/:key/callback", get(handlers::callback))
        .route("/api/social/:key/accounts", get(handlers::get_social_accounts))
        // Badge endpoints
        .route(
            "/api/badges",
            get(handlers::list_badges).post(handlers::create_badge),
        )
        .route("/api/badges/:address", get(handlers::get_user_badges))
        // Spike endpoints
        .route("/api/spikes", get(handlers::list_spikes))
        // WebSocket endpoint
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
