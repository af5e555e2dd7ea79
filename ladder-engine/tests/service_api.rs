//! HTTP surface tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use ladder_common::config::Config;
use ladder_engine::types::{AssetSnapshot, Indicators, PendingOrder, PortfolioSnapshot, Probability};
use ladder_engine::{build_router, AllocationPlanner, AllocatorConfig, AllocatorState, InMemoryBannedZones};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    build_router(Arc::new(AllocatorState::new(
        Config::default(),
        AllocatorConfig::default(),
    )))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn asset(ticker: &str, price: f64, sma200: f64, rsi: f64, volume: f64) -> Value {
    json!({
        "ticker": ticker,
        "price": price,
        "indicators": {
            "rsi": rsi,
            "sma200": sma200,
            "ema20": price,
            "volume": volume,
            "volume_avg20": 1_000_000.0,
            "drawdown_60d": 5.0
        }
    })
}

fn stressed_series(price: f64, sma200: f64, rsi: f64, volume: f64, drawdown: f64) -> Value {
    json!({
        "indicators": {
            "price": price,
            "rsi": rsi,
            "sma200": sma200,
            "ema20": price * 0.95,
            "volume": volume,
            "volume_avg20": 1_000_000.0,
            "drawdown_60d": drawdown
        }
    })
}

fn stressed_market() -> Value {
    json!({
        "SPY": stressed_series(90.0, 100.0, 40.0, 1_000_000.0, 10.0),
        "NVDA": stressed_series(100.0, 130.0, 30.0, 400_000.0, 25.0)
    })
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = send(test_app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "ladder-engine");
}

#[tokio::test]
async fn test_create_plan() {
    let snapshot = json!({
        "cash_available": 10_000.0,
        "assets": {
            "SPY": asset("SPY", 110.0, 100.0, 60.0, 1_000_000.0),
            "AAPL": asset("AAPL", 100.0, 100.0, 50.0, 1_000_000.0)
        }
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan", Some(snapshot)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["trace_id"].as_str().unwrap().is_empty());
    assert!(body["generated_at"].is_string());
    assert_eq!(body["asset_plans"]["AAPL"]["regime"]["phase"], "NORMAL");
    assert!(body["asset_plans"].get("SPY").is_none());
    assert_eq!(body["global"]["dry_powder"], 10_000.0);
    assert_eq!(body["global"]["regime"]["regime"], "NORMAL");
}

#[tokio::test]
async fn test_mismatched_ticker_is_bad_request() {
    let snapshot = json!({
        "cash_available": 10_000.0,
        "assets": { "FOO": asset("ETH", 100.0, 100.0, 50.0, 1_000_000.0) }
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan", Some(snapshot)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("FOO"));
}

#[tokio::test]
async fn test_malformed_asset_is_skipped() {
    let snapshot = json!({
        "cash_available": 10_000.0,
        "assets": {
            "AAPL": asset("AAPL", 0.0, 100.0, 50.0, 1_000_000.0),
            "MSFT": asset("MSFT", 100.0, 100.0, 50.0, 1_000_000.0)
        }
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan", Some(snapshot)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["asset_plans"].get("AAPL").is_none());
    assert_eq!(body["asset_plans"]["MSFT"]["regime"]["phase"], "NORMAL");
    assert_eq!(body["skipped_assets"][0]["ticker"], "AAPL");
}

#[tokio::test]
async fn test_market_plan_from_series() {
    let request = json!({
        "series": stressed_market(),
        "state": {
            "cash": 50_000,
            "holdings": { "NVDA": 10 },
            "limits": { "NVDA": [{ "price": 95, "size": 4, "probability": 60 }] }
        }
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan/market", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["cash_available"], 50_000.0);
    assert_eq!(body["snapshot"]["assets"]["NVDA"]["position_shares"], 10);

    let nvda = &body["asset_plans"]["NVDA"];
    assert_eq!(nvda["regime"]["phase"], "RESET");
    let statuses: Vec<&str> = nvda["ladder"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"CANCEL"));
    assert!(statuses.contains(&"NEW"));
}

#[tokio::test]
async fn test_market_plan_state_as_string() {
    let request = json!({
        "series": stressed_market(),
        "state": r#"{ "cash": 2500 }"#
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan/market", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["global"]["initial_cash"], 2500.0);
}

#[tokio::test]
async fn test_market_plan_malformed_state() {
    let request = json!({
        "series": stressed_market(),
        "state": "{ holdings: "
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/plan/market", Some(request)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_ban_then_list_zones() {
    let app = test_app();

    let (status, zone) = send(
        app.clone(),
        "POST",
        "/api/v1/banned-zones",
        Some(json!({ "ticker": "NVDA", "price": 100.0, "reason": "bad fill" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!((zone["min"].as_f64().unwrap() - 97.0).abs() < 1e-9);
    assert!((zone["max"].as_f64().unwrap() - 103.0).abs() < 1e-9);

    let (status, body) = send(app.clone(), "GET", "/api/v1/banned-zones/NVDA", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticker"], "NVDA");
    assert_eq!(body["zones"].as_array().unwrap().len(), 1);
    assert_eq!(body["zones"][0]["reason"], "bad fill");

    let (_, body) = send(app, "GET", "/api/v1/banned-zones/AAPL", None).await;
    assert!(body["zones"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ban_rejects_bad_input() {
    let (status, _) = send(
        test_app(),
        "POST",
        "/api/v1/banned-zones",
        Some(json!({ "ticker": " ", "price": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        test_app(),
        "POST",
        "/api/v1/banned-zones",
        Some(json!({ "ticker": "NVDA", "price": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_banned_zone_applies_to_later_plans() {
    let app = test_app();

    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/v1/banned-zones",
        Some(json!({ "ticker": "NVDA", "price": 103.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = json!({ "series": stressed_market(), "cash": 100_000.0 });
    let (status, body) = send(app, "POST", "/api/v1/plan/market", Some(request)).await;
    assert_eq!(status, StatusCode::OK);

    let rejected = body["rejected_rungs"].as_array().unwrap();
    assert!(rejected
        .iter()
        .any(|r| r["ticker"] == "NVDA" && r["reason"] == "BANNED_ZONE"));
    assert!(body["asset_plans"]["NVDA"]["ladder"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] != "NEW"));
}

#[tokio::test]
async fn test_commit_endpoint() {
    let mut aapl = AssetSnapshot {
        ticker: "AAPL".into(),
        price: 80.0,
        indicators: Indicators {
            rsi: 25.0,
            sma200: 100.0,
            ema20: 95.0,
            volume: 300_000.0,
            volume_avg20: 1_000_000.0,
            drawdown_60d: 30.0,
            change_24h_pct: None,
        },
        position_shares: 20,
        pending_orders: Vec::new(),
    };
    aapl.pending_orders
        .push(PendingOrder::new(75.0, 10, Probability::P30));
    let snapshot = PortfolioSnapshot::new(1_000.0).with_asset(aapl);
    let plan = AllocationPlanner::default()
        .plan(&snapshot, &InMemoryBannedZones::new(3.0))
        .unwrap();

    let request = json!({
        "state": {
            "cash": 1000,
            "holdings": { "AAPL": 20 },
            "limits": { "AAPL": [{ "price": 75.0, "size": 10 }] }
        },
        "plan": serde_json::to_value(&plan).unwrap()
    });

    let (status, body) = send(test_app(), "POST", "/api/v1/commit", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["holdings"]["AAPL"], 0);
    assert!(body["state"]["limits"].get("AAPL").is_none());
    assert_eq!(body["applied"].as_array().unwrap().len(), 2);
}
