//! End-to-end tests of the HTTP API against an in-memory SQLite database and
//! a fixed-price oracle.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use meridian::application::router::build_router;
use meridian::application::state::{AppState, Stores};
use meridian::config::AppConfig;
use meridian::domain::repositories::narrative::DisabledNarrative;
use meridian::domain::repositories::price_oracle::{
    ClosePoint, PriceHistory, PriceOracle, QuoteResult,
};
use meridian::domain::services::account_service::AccountService;
use meridian::domain::value_objects::{period::Period, ticker::Ticker};
use meridian::persistence::init_database;
use meridian::persistence::repository::{
    AccountRepository, LeaderboardRepository, LedgerRepository,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "e2e-test-secret-0123456789abcdef";

struct FixedOracle;

#[async_trait]
impl PriceOracle for FixedOracle {
    async fn get_quote(&self, ticker: &Ticker, _period: Period) -> QuoteResult {
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        match ticker.as_str() {
            "AAPL" => QuoteResult::Found(PriceHistory {
                ticker: ticker.clone(),
                name: Some("Apple Inc.".to_string()),
                closes: vec![
                    ClosePoint { date: day(3), close: dec!(190) },
                    ClosePoint { date: day(4), close: dec!(200) },
                ],
            }),
            "DOWN" => QuoteResult::TransientError("connection reset".to_string()),
            _ => QuoteResult::NotFound,
        }
    }
}

async fn setup(extra: &[(&str, &str)]) -> (Router, AppState) {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("JWT_SECRET".into(), SECRET.into());
    vars.insert("QUOTE_CACHE_TTL_SECONDS".into(), "0".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

    let pool = init_database("sqlite::memory:", 1).await.unwrap();
    let stores = Stores {
        accounts: Arc::new(AccountRepository::new(pool.clone())),
        ledger: Arc::new(LedgerRepository::new(pool.clone())),
        leaderboard: Arc::new(LeaderboardRepository::new(pool)),
    };
    let accounts = AccountService::new(
        stores.accounts.clone(),
        stores.ledger.clone(),
        config.starting_balance,
    )
    .with_hash_cost(4);

    let state = AppState::new(
        &config,
        stores,
        Arc::new(FixedOracle),
        Arc::new(DisabledNarrative),
    )
    .with_account_service(accounts);

    (build_router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({"username": username, "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

fn num(v: &Value) -> f64 {
    v.as_f64().unwrap_or_else(|| panic!("not a number: {}", v))
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = setup(&[]).await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let (app, _) = setup(&[]).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({"username": "alice", "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["username"], "alice");
    assert_eq!(num(&body["balance"]), 100000.0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({"username": "alice", "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, "/api/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(num(&body["balance"]), 100000.0);
}

#[tokio::test]
async fn test_registration_and_login_failures() {
    let (app, _) = setup(&[]).await;
    register(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({"username": "alice", "password": "another-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "username_taken");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({"username": "alice", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({"username": "bob", "password": "short"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _) = setup(&[]).await;

    for uri in ["/api/portfolio", "/api/user", "/api/leaderboard/top10"] {
        let (status, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["kind"], "unauthorized");
    }

    let (status, _) = send(&app, Method::GET, "/api/portfolio", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trade_flow_updates_portfolio_and_history() {
    let (app, _) = setup(&[]).await;
    let token = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/buy",
        Some(&token),
        Some(json!({"ticker": "aapl", "shares": 10, "price": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["ticker"], "AAPL");
    assert_eq!(num(&body["balance"]), 98500.0);
    assert_eq!(body["message"], "Bought 10 shares of AAPL at $150.00");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sell",
        Some(&token),
        Some(json!({"ticker": "AAPL", "shares": 4, "price": 180})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(num(&body["balance"]), 99220.0);

    let (status, body) = send(&app, Method::GET, "/api/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(num(&body["balance"]), 99220.0);
    let holdings = body["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0]["ticker"], "AAPL");
    assert_eq!(num(&holdings[0]["shares"]), 6.0);
    assert_eq!(num(&holdings[0]["avg_price"]), 150.0);
    assert_eq!(num(&holdings[0]["current_price"]), 200.0);
    assert_eq!(num(&holdings[0]["market_value"]), 1200.0);
    assert_eq!(holdings[0]["quote_available"], true);
    assert_eq!(num(&body["total_value"]), 100420.0);

    let (status, body) = send(&app, Method::GET, "/api/transactions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["transactions"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["action"], "SELL");
    assert_eq!(history[1]["action"], "BUY");

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/transactions?limit=1",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_trades_leave_balance_untouched() {
    let (app, _) = setup(&[]).await;
    let token = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/buy",
        Some(&token),
        Some(json!({"ticker": "AAPL", "shares": 1000, "price": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "insufficient_funds");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sell",
        Some(&token),
        Some(json!({"ticker": "AAPL", "shares": 1, "price": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "insufficient_shares");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/buy",
        Some(&token),
        Some(json!({"ticker": "AAPL", "shares": -3, "price": 150})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/buy",
        Some(&token),
        Some(json!({"ticker": "AAPL"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let (_, body) = send(&app, Method::GET, "/api/user", Some(&token), None).await;
    assert_eq!(num(&body["balance"]), 100000.0);
}

#[tokio::test]
async fn test_stock_detail_and_search() {
    let (app, _) = setup(&[]).await;
    let token = register(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/stock/AAPL?period=1mo",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Apple Inc.");
    assert_eq!(num(&body["current_price"]), 200.0);
    assert_eq!(num(&body["change"]), 10.0);
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert!(body.get("narrative").is_none());

    let (status, body) = send(&app, Method::GET, "/api/search/aapl", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticker"], "AAPL");

    let (status, body) = send(&app, Method::GET, "/api/stock/NOPE", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "quote_unavailable");

    let (status, _) = send(&app, Method::GET, "/api/stock/DOWN", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/stock/AAPL?period=3weeks",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn test_leaderboard_ranks_by_balance() {
    let (app, state) = setup(&[]).await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    send(
        &app,
        Method::POST,
        "/api/buy",
        Some(&alice),
        Some(json!({"ticker": "AAPL", "shares": 10, "price": 150})),
    )
    .await;

    state.leaderboard.recompute().await.unwrap();

    let (status, body) = send(&app, Method::GET, "/api/leaderboard/top10", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let leaders = body["leaders"].as_array().unwrap();
    assert_eq!(leaders.len(), 2);
    assert_eq!(leaders[0]["rank"], 1);
    assert_eq!(leaders[0]["username"], "bob");
    assert_eq!(num(&leaders[0]["score"]), 100000.0);
    assert_eq!(leaders[1]["username"], "alice");
    assert_eq!(num(&leaders[1]["score"]), 98500.0);
}

#[tokio::test]
async fn test_rate_limit_per_account() {
    let (app, _) = setup(&[("RATE_LIMIT_PER_MINUTE", "2")]).await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    for _ in 0..2 {
        let (status, _) = send(&app, Method::GET, "/api/user", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, Method::GET, "/api/user", Some(&alice), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "rate_limited");

    let (status, _) = send(&app, Method::GET, "/api/user", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
}
