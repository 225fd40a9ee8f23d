use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use futures::StreamExt;
use gorillionaire::{
    adapters::{MemoryStore, OAuthProfile, OAuthProvider, Store},
    api::{create_router, AdminAuth, AppState},
    domain::{SignalAction, SocialProvider, Spike, TradingSignal, WsMessage},
    error::Result,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_TOKEN: &str = "test-admin-token";
const ALICE: &str = "0x00000000000000000000000000000000000000a1";
const BOB: &str = "0x00000000000000000000000000000000000000b2";
const CAROL: &str = "0x00000000000000000000000000000000000000c3";

/// OAuth provider that never leaves the process and counts exchanges
struct FakeOAuth {
    provider: SocialProvider,
    exchanges: Arc<AtomicUsize>,
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn provider(&self) -> SocialProvider {
        self.provider
    }

    fn authorize_url(&self, state: &str, _code_verifier: &str) -> Result<String> {
        Ok(format!("https://provider.example/authorize?state={state}"))
    }

    async fn exchange(&self, code: &str, _code_verifier: &str) -> Result<OAuthProfile> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(OAuthProfile {
            external_id: format!("ext-{code}"),
            username: "gorilla".to_string(),
        })
    }
}

fn sample_signal() -> TradingSignal {
    TradingSignal {
        id: Uuid::new_v4(),
        symbol: "MON".to_string(),
        action: SignalAction::Buy,
        confidence: 0.8,
        reasoning: "holder growth".to_string(),
        price_usd: Some(dec!(1.25)),
        created_at: Utc::now(),
    }
}

fn sample_spike(token: &str) -> Spike {
    Spike {
        id: Uuid::new_v4(),
        token_address: token.to_string(),
        token_symbol: "CHOG".to_string(),
        window_secs: 900,
        previous_count: 10,
        current_count: 25,
        change_pct: 150.0,
        detected_at: Utc::now(),
    }
}

struct TestContext {
    app: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    exchanges: Arc<AtomicUsize>,
}

impl TestContext {
    async fn new() -> Self {
        Self::with_admin(AdminAuth::new(Some(ADMIN_TOKEN.to_string()), true)).await
    }

    async fn with_admin(admin: AdminAuth) -> Self {
        let store = Arc::new(MemoryStore::new());
        let exchanges = Arc::new(AtomicUsize::new(0));

        let state = AppState::new(store.clone(), 64, 600, admin).with_oauth_provider(Arc::new(
            FakeOAuth {
                provider: SocialProvider::Discord,
                exchanges: exchanges.clone(),
            },
        ));
        state
            .badges
            .seed_defaults()
            .await
            .expect("failed to seed badges");

        Self {
            app: create_router(state.clone(), &[]),
            state,
            store,
            exchanges,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with_headers(method, uri, &[], body).await
    }

    async fn send_with_headers(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request_builder = Request::builder().method(method).uri(uri);
        for (key, value) in headers {
            request_builder = request_builder.header(*key, *value);
        }

        let request = if let Some(payload) = body {
            request_builder
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
        } else {
            request_builder.body(Body::empty())
        }
        .expect("failed to build request");

        self.dispatch(request).await
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut request_builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            request_builder = request_builder.header("content-type", content_type);
        }
        let request = request_builder
            .body(Body::from(body.to_string()))
            .expect("failed to build request");

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    async fn seed_signal(&self) -> TradingSignal {
        let signal = sample_signal();
        self.store.insert_signal(&signal).await.unwrap();
        signal
    }

    async fn points(&self, address: &str) -> i64 {
        let (status, body) = self
            .send(Method::GET, &format!("/api/activity/{address}/points"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["points"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_and_jobs_endpoints() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "connected");

    let (status, body) = ctx.send(Method::GET, "/api/system/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"], json!([]));
}

#[tokio::test]
async fn test_invalid_addresses_are_rejected_with_json_error() {
    let ctx = TestContext::new().await;

    for uri in [
        "/api/activity/not-an-address",
        "/api/activity/0x123/points",
        "/api/signals/user/0xZZ00000000000000000000000000000000000000",
        "/api/referral/alice",
        "/api/access/v2/0x",
        "/api/badges/bob",
        "/api/social/nobody/accounts",
    ] {
        let (status, body) = ctx.send(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn test_activity_record_and_feed() {
    let ctx = TestContext::new().await;
    let admin = [("x-admin-token", ADMIN_TOKEN)];

    let (status, body) = ctx
        .send_with_headers(
            Method::POST,
            "/api/activity",
            &admin,
            Some(json!({"user_address": ALICE.to_uppercase().replace("0X", "0x"), "kind": "social_link"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_address"], ALICE);
    assert_eq!(body["points"], 20);

    for kind in ["dancing", "badge_awarded"] {
        let (status, body) = ctx
            .send_with_headers(
                Method::POST,
                "/api/activity",
                &admin,
                Some(json!({"user_address": ALICE, "kind": kind})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{kind}");
        assert!(body["error"].is_string(), "{kind}");
    }

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/activity/{ALICE}?limit=500"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(ctx.points(ALICE).await, 20);
}

#[tokio::test]
async fn test_activity_cannot_be_forged_without_admin_token() {
    let ctx = TestContext::new().await;

    for kind in ["referral", "social_link", "trade", "trade", "trade"] {
        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/activity",
                Some(json!({"user_address": ALICE, "kind": kind})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{kind}");
        assert!(body["error"].is_string());
    }
    assert_eq!(ctx.points(ALICE).await, 0);

    // Even an admin-recorded trade event is not a trade
    let (status, _) = ctx
        .send_with_headers(
            Method::POST,
            "/api/activity",
            &[("x-admin-token", ADMIN_TOKEN)],
            Some(json!({"user_address": ALICE, "kind": "trade"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, badges) = ctx
        .send(Method::GET, &format!("/api/badges/{ALICE}"), None)
        .await;
    assert!(badges.as_array().unwrap().is_empty());

    let (_, summary) = ctx
        .send(Method::GET, &format!("/api/referral/{ALICE}"), None)
        .await;
    assert_eq!(summary["referrals"], 0);
}

#[tokio::test]
async fn test_malformed_requests_get_json_bad_request() {
    let ctx = TestContext::new().await;
    let admin = [("x-admin-token", ADMIN_TOKEN)];

    // Missing fields
    for (uri, body) in [
        ("/api/activity", json!({"kind": "trade"})),
        ("/api/referral/redeem", json!({"address": ALICE})),
        ("/api/referral/code", json!({})),
        ("/api/trades", json!({"user_address": ALICE, "symbol": "MON"})),
        ("/api/badges", json!({"slug": "whale"})),
    ] {
        let (status, body) = ctx
            .send_with_headers(Method::POST, uri, &admin, Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }

    // Wrong field type
    let signal = ctx.seed_signal().await;
    let (status, body) = ctx
        .send(
            Method::POST,
            &format!("/api/signals/{}/respond", signal.id),
            Some(json!({"user_address": ALICE, "choice": 7})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Not JSON at all, and JSON without a content type
    let (status, body) = ctx
        .send_raw(Method::POST, "/api/referral/code", Some("application/json"), "{not json")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = ctx
        .send_raw(Method::POST, "/api/referral/code", None, r#"{"address":"0x1"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Bad path and query parameters
    for uri in [
        "/api/signals/not-a-uuid",
        "/api/leaderboard?limit=many",
        "/api/spikes?limit=-x",
    ] {
        let (status, body) = ctx.send(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn test_trade_is_recorded_broadcast_and_scored() {
    let ctx = TestContext::new().await;
    let mut ws_rx = ctx.state.ws_tx.subscribe();

    let (status, body) = ctx
        .send(
            Method::POST,
            "/api/trades",
            Some(json!({
                "user_address": ALICE,
                "symbol": "mon",
                "side": "buy",
                "amount": "12.5",
                "price_usd": "1.30",
                "tx_hash": "0xabc"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["trade"]["symbol"], "MON");
    assert_eq!(body["points_awarded"], 10);
    assert_eq!(body["badges_awarded"][0]["slug"], "first-trade");

    match ws_rx.recv().await.unwrap() {
        WsMessage::Trade(trade) => assert_eq!(trade.user_address, ALICE),
        other => panic!("unexpected message: {:?}", other),
    }

    for bad in [
        json!({"user_address": ALICE, "symbol": "MON", "side": "hold", "amount": "1"}),
        json!({"user_address": ALICE, "symbol": "MON", "side": "sell", "amount": "0"}),
        json!({"user_address": ALICE, "symbol": " ", "side": "sell", "amount": "1"}),
        json!({"user_address": "0x1", "symbol": "MON", "side": "sell", "amount": "1"}),
    ] {
        let (status, _) = ctx.send(Method::POST, "/api/trades", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Points from the trade plus nothing for the badge itself
    assert_eq!(ctx.points(ALICE).await, 10);

    let (status, body) = ctx.send(Method::GET, "/api/leaderboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user_address"], ALICE);
    assert_eq!(body[0]["points"], 10);
}

#[tokio::test]
async fn test_signal_listing_and_lookup() {
    let ctx = TestContext::new().await;
    let signal = ctx.seed_signal().await;

    let (status, body) = ctx.send(Method::GET, "/api/signals?symbol=mon", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = ctx.send(Method::GET, "/api/signals?symbol=CHOG", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/signals/{}", signal.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "BUY");

    let (status, _) = ctx
        .send(Method::GET, &format!("/api/signals/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signal_response_statuses() {
    let ctx = TestContext::new().await;
    let signal = ctx.seed_signal().await;
    let uri = format!("/api/signals/{}/respond", signal.id);

    let (status, body) = ctx
        .send(
            Method::POST,
            &uri,
            Some(json!({"user_address": ALICE, "choice": "accept"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["points_awarded"], 5);
    assert_eq!(body["badges_awarded"][0]["slug"], "first-signal");

    // Second answer to the same signal
    let (status, body) = ctx
        .send(
            Method::POST,
            &uri,
            Some(json!({"user_address": ALICE, "choice": "refuse"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = ctx
        .send(
            Method::POST,
            &uri,
            Some(json!({"user_address": BOB, "choice": "maybe"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send(
            Method::POST,
            &format!("/api/signals/{}/respond", Uuid::new_v4()),
            Some(json!({"user_address": BOB, "choice": "accept"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/signals/user/{ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["choice"], "accept");

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/badges/{ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["badge"]["slug"], "first-signal");
}

#[tokio::test]
async fn test_referral_flow() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send(Method::POST, "/api/referral/code", Some(json!({"address": ALICE})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);

    // Idempotent
    let (_, body) = ctx
        .send(Method::POST, "/api/referral/code", Some(json!({"address": ALICE})))
        .await;
    assert_eq!(body["code"], code.as_str());

    // Self-referral
    let (status, _) = ctx
        .send(
            Method::POST,
            "/api/referral/redeem",
            Some(json!({"address": ALICE, "code": code})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed code
    let (status, _) = ctx
        .send(
            Method::POST,
            "/api/referral/redeem",
            Some(json!({"address": BOB, "code": "nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Well-formed but unknown
    let (status, _) = ctx
        .send(
            Method::POST,
            "/api/referral/redeem",
            Some(json!({"address": BOB, "code": "ZZZZZZZZ"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = ctx
        .send(
            Method::POST,
            "/api/referral/redeem",
            Some(json!({"address": BOB, "code": code.to_lowercase()})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["referrer"], ALICE);

    // Already referred, even by another code
    let (_, carol) = ctx
        .send(Method::POST, "/api/referral/code", Some(json!({"address": CAROL})))
        .await;
    let (status, _) = ctx
        .send(
            Method::POST,
            "/api/referral/redeem",
            Some(json!({"address": BOB, "code": carol["code"]})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/referral/{ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referrals"], 1);
    assert_eq!(body["code"], code.as_str());

    let (_, body) = ctx
        .send(Method::GET, &format!("/api/referral/{BOB}"), None)
        .await;
    assert_eq!(body["referred_by"], ALICE);
    assert!(body["code"].is_null());

    assert_eq!(ctx.points(ALICE).await, 50);
}

#[tokio::test]
async fn test_v2_access_requires_admin_to_change() {
    let ctx = TestContext::new().await;
    let uri = format!("/api/access/v2/{ALICE}");

    let (status, body) = ctx.send(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_access"], false);

    let (status, _) = ctx
        .send(Method::PUT, &uri, Some(json!({"has_access": true})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .send_with_headers(
            Method::PUT,
            &uri,
            &[("x-admin-token", "wrong")],
            Some(json!({"has_access": true})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = format!("Bearer {ADMIN_TOKEN}");
    let (status, body) = ctx
        .send_with_headers(
            Method::PUT,
            &uri,
            &[("authorization", bearer.as_str())],
            Some(json!({"has_access": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_access"], true);

    let (_, body) = ctx.send(Method::GET, &uri, None).await;
    assert_eq!(body["has_access"], true);
}

#[tokio::test]
async fn test_admin_endpoints_unavailable_without_configured_token() {
    let ctx = TestContext::with_admin(AdminAuth::new(None, true)).await;

    let (status, _) = ctx
        .send(
            Method::PUT,
            &format!("/api/access/v2/{ALICE}"),
            Some(json!({"has_access": true})),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_oauth_state_is_validated_before_exchange() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx
        .send(Method::GET, &format!("/api/social/myspace/authorize?address={ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(Method::GET, &format!("/api/social/twitter/authorize?address={ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = ctx
        .send(Method::GET, "/api/social/discord/authorize?address=0x1", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown and missing state
    for uri in [
        "/api/social/discord/callback?code=abc&state=forged",
        "/api/social/discord/callback?code=abc",
    ] {
        let (status, _) = ctx.send(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
    assert_eq!(ctx.exchanges.load(Ordering::SeqCst), 0);

    // State issued for discord presented on the twitter callback
    let (status, body) = ctx
        .send(Method::GET, &format!("/api/social/discord/authorize?address={ALICE}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let state = body["state"].as_str().unwrap().to_string();
    assert!(body["url"].as_str().unwrap().contains(&state));

    let (status, _) = ctx
        .send(
            Method::GET,
            &format!("/api/social/twitter/callback?code=abc&state={state}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.exchanges.load(Ordering::SeqCst), 0);

    // Fresh state, valid callback, then replay
    let (_, body) = ctx
        .send(Method::GET, &format!("/api/social/discord/authorize?address={ALICE}"), None)
        .await;
    let state = body["state"].as_str().unwrap().to_string();
    let callback = format!("/api/social/discord/callback?code=abc&state={state}");

    let (status, body) = ctx.send(Method::GET, &callback, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["user_address"], ALICE);
    assert_eq!(body["account"]["external_id"], "ext-abc");
    assert_eq!(body["points_awarded"], 20);
    assert_eq!(body["badges_awarded"][0]["slug"], "socialite");

    let (status, _) = ctx.send(Method::GET, &callback, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.exchanges.load(Ordering::SeqCst), 1);

    let (status, body) = ctx
        .send(Method::GET, &format!("/api/social/{ALICE}/accounts"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["provider"], "discord");
}

#[tokio::test]
async fn test_oauth_account_linked_to_another_wallet_conflicts() {
    let ctx = TestContext::new().await;

    for (address, expected) in [(ALICE, StatusCode::OK), (BOB, StatusCode::CONFLICT)] {
        let (_, body) = ctx
            .send(Method::GET, &format!("/api/social/discord/authorize?address={address}"), None)
            .await;
        let state = body["state"].as_str().unwrap().to_string();
        let (status, _) = ctx
            .send(
                Method::GET,
                &format!("/api/social/discord/callback?code=same&state={state}"),
                None,
            )
            .await;
        assert_eq!(status, expected, "{address}");
    }
}

#[tokio::test]
async fn test_badge_catalogue_admin_create() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.send(Method::GET, "/api/badges", None).await;
    assert_eq!(status, StatusCode::OK);
    let seeded = body.as_array().unwrap().len();
    assert!(seeded > 0);

    let badge = json!({
        "slug": "whale",
        "name": "Whale",
        "description": "Ten trades",
        "criterion": {"type": "trades", "threshold": 10}
    });

    let (status, _) = ctx.send(Method::POST, "/api/badges", Some(badge.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = [("x-admin-token", ADMIN_TOKEN)];
    let (status, body) = ctx
        .send_with_headers(Method::POST, "/api/badges", &admin, Some(badge.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["criterion"]["threshold"], 10);

    let (status, _) = ctx
        .send_with_headers(Method::POST, "/api/badges", &admin, Some(badge))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .send_with_headers(
            Method::POST,
            "/api/badges",
            &admin,
            Some(json!({"slug": "Bad Slug", "name": "x", "criterion": {"type": "social_linked"}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = ctx.send(Method::GET, "/api/badges", None).await;
    assert_eq!(body.as_array().unwrap().len(), seeded + 1);
}

#[tokio::test]
async fn test_spikes_listing_filters_by_token() {
    let ctx = TestContext::new().await;
    let token = "0x00000000000000000000000000000000000000c0";
    ctx.store.insert_spike(&sample_spike(token)).await.unwrap();

    let (status, body) = ctx.send(Method::GET, "/api/spikes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = ctx
        .send(Method::GET, &format!("/api/spikes?token={}", token.to_uppercase().replace("0X", "0x")), None)
        .await;
    assert_eq!(body[0]["token_symbol"], "CHOG");

    let (_, body) = ctx
        .send(Method::GET, "/api/spikes?token=0x00000000000000000000000000000000000000ff", None)
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_signal_stream_emits_signal_events() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .uri("/api/signals/stream")
        .body(Body::empty())
        .expect("failed to build request");
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");

    let signal = sample_signal();
    ctx.state
        .signal_tx
        .send(signal.clone())
        .expect("stream did not subscribe");

    let mut frames = response.into_body().into_data_stream();
    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("timed out waiting for an SSE frame")
            .expect("stream ended")
            .expect("body error");
        received.push_str(std::str::from_utf8(&chunk).unwrap());
    }

    assert!(received.lines().any(|l| l == "event: signal"), "{received}");
    let data = received
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("no data line");
    let payload: Value = serde_json::from_str(data).unwrap();
    assert_eq!(payload["id"], signal.id.to_string());
    assert_eq!(payload["action"], "BUY");
    assert_eq!(payload["symbol"], "MON");
}

#[tokio::test]
async fn test_websocket_fans_out_feed_messages() {
    let ctx = TestContext::new().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ctx.app.clone();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket handshake failed");

    // The handler subscribes right after the upgrade completes
    timeout(Duration::from_secs(5), async {
        while ctx.state.ws_tx.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("websocket never subscribed");

    let signal = sample_signal();
    ctx.state.broadcast(WsMessage::Signal(signal.clone()));
    ctx.state
        .broadcast(WsMessage::Spike(sample_spike("0x00000000000000000000000000000000000000c0")));

    for expected in ["signal", "spike"] {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a websocket message")
            .expect("websocket closed")
            .expect("websocket error");
        let value: Value = serde_json::from_str(&message.into_text().unwrap()).unwrap();
        assert_eq!(value["type"], expected);
        if expected == "signal" {
            assert_eq!(value["data"]["id"], signal.id.to_string());
        } else {
            assert_eq!(value["data"]["token_symbol"], "CHOG");
        }
    }

    socket.close(None).await.ok();
}
