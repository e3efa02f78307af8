//! `ApiClient` against a local axum backend.

use agentboard::adapters::{ApiBody, ApiClient, DashboardApi, SessionHook};
use agentboard::config::ApiConfig;
use agentboard::domain::AgentKey;
use agentboard::sync::CancellationToken;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Method;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingHook {
    expired: AtomicUsize,
}

impl SessionHook for CountingHook {
    fn session_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/agents/7/rank",
            get(|| async { Json(json!({"rank": 2, "return_rate": 0.1})) }),
        )
        .route(
            "/api/agents/8/rank",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "agent not found"}))) }),
        )
        .route(
            "/api/agents/9/rank",
            get(|| async { (StatusCode::UNAUTHORIZED, "login required") }),
        )
        .route(
            "/api/activities/1/leaderboard",
            get(|| async {
                Json(json!({"items": [
                    {"user_id": 1, "user_name": "alice", "agent_id": 10, "return_pct": 0.12},
                    {"user_id": 2, "agent_id": 11, "return_pct": -0.03}
                ]}))
            }),
        )
        .route(
            "/api/activities/2/leaderboard",
            get(|| async { Json(json!([{"agent_id": 12, "return_pct": 4.5}])) }),
        )
        .route(
            "/api/agents/by-user/5",
            get(|| async { Json(json!({"id": 42, "user_id": 5, "name": "momentum", "model": "v2"})) }),
        )
        .route(
            "/api/agents/3/holdings",
            get(|| async {
                Json(json!({"items": [{
                    "stock_code": "600519",
                    "stock_name": "Moutai",
                    "quantity": "100",
                    "latest_price": "1688.5",
                    "profit_loss_pct": 0.02
                }]}))
            }),
        )
        .route("/api/ping", get(|| async { "pong" }))
        .route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: format!("http://{addr}/api"),
        ..ApiConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn json_and_text_bodies() {
    let api = client(spawn_backend().await);
    let token = CancellationToken::new();

    let rank = api.rank(7, token.clone()).await.unwrap();
    assert_eq!(rank.rank, Some(2));
    assert!((rank.return_percent() - 10.0).abs() < 1e-9);

    let body = api.request(Method::GET, "ping", None, &token).await.unwrap();
    assert_eq!(body, ApiBody::Text("pong".to_string()));
}

#[tokio::test]
async fn lists_accept_bare_and_wrapped_shapes() {
    let api = client(spawn_backend().await);

    let wrapped = api.leaderboard(1, CancellationToken::new()).await.unwrap();
    assert_eq!(wrapped.len(), 2);
    assert_eq!(wrapped[0].display_name(), "alice");
    assert_eq!(wrapped[1].display_name(), "user 2");

    let bare = api.leaderboard(2, CancellationToken::new()).await.unwrap();
    assert_eq!(bare[0].agent_id, 12);
    assert!((bare[0].return_percent() - 4.5).abs() < 1e-9);
}

#[tokio::test]
async fn profile_and_holdings_decode() {
    let api = client(spawn_backend().await);

    let profile = api
        .agent(AgentKey::User(5), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(profile.id, 42);
    assert_eq!(profile.extra.get("model"), Some(&json!("v2")));

    let holdings = api.holdings(3, CancellationToken::new()).await.unwrap();
    assert_eq!(holdings.items.len(), 1);
    assert_eq!(holdings.total_market_value().to_string(), "168850.0");
}

#[tokio::test]
async fn http_errors_carry_status_and_backend_message() {
    let hook = Arc::new(CountingHook::default());
    let api = client(spawn_backend().await).with_session_hook(hook.clone());

    let err = api.rank(8, CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "HTTP 404: agent not found");
    assert_eq!(hook.expired.load(Ordering::SeqCst), 0);

    let err = api.rank(9, CancellationToken::new()).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "HTTP 401: login required");
    assert_eq!(hook.expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_request() {
    let api = client(spawn_backend().await);
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        api.request(Method::GET, "slow", None, &token),
    )
    .await
    .expect("cancellation should end the request well before the server answers");
    let err = result.unwrap_err();
    assert!(err.is_cancelled());
}
