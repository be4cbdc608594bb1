// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Integration tests for the BitMEX HTTP client and order submitter using a
//! mock server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use axum::{
    Router,
    extract::{Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use bitmex_hub::{
    BitmexClientConfig, BitmexError,
    common::enums::{BitmexOrderType, BitmexSide, OrderStatus},
    execution::{NormalizedPlaceInput, OrderSubmitter, validate_place_input},
    http::client::BitmexHttpClient,
    state::BitmexState,
};
use rstest::rstest;
use serde_json::{Value, json};
use ustr::Ustr;

#[derive(Clone, Default)]
struct TestServerState {
    post_count: Arc<StdMutex<usize>>,
    get_count: Arc<StdMutex<usize>>,
    post_bodies: Arc<StdMutex<Vec<Value>>>,
    post_headers: Arc<StdMutex<Vec<(Option<String>, Option<String>, Option<String>)>>>,
    fail_posts_with: Arc<StdMutex<Vec<StatusCode>>>,
    post_delay_ms: Arc<StdMutex<Option<u64>>>,
    order_id: Arc<StdMutex<String>>,
    reconcile_row: Arc<StdMutex<Option<Value>>>,
}

impl TestServerState {
    fn new(order_id: &str) -> Self {
        let state = Self::default();
        *state.order_id.lock().unwrap() = order_id.to_string();
        state
    }

    fn post_count(&self) -> usize {
        *self.post_count.lock().unwrap()
    }
}

fn order_ack(order_id: &str, body: &Value) -> Value {
    json!({
        "orderID": order_id,
        "clOrdID": body.get("clOrdID").cloned().unwrap_or(Value::Null),
        "symbol": body.get("symbol").cloned().unwrap_or(Value::Null),
        "side": body.get("side").cloned().unwrap_or(Value::Null),
        "orderQty": body.get("orderQty").cloned().unwrap_or(Value::Null),
        "ordType": body.get("ordType").cloned().unwrap_or(Value::Null),
        "ordStatus": "New",
        "execType": "New",
        "leavesQty": body.get("orderQty").cloned().unwrap_or(Value::Null),
        "cumQty": 0,
        "timestamp": "2024-01-05T00:01:20.000Z",
    })
}

async fn handle_post_order(
    State(state): State<TestServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    *state.post_count.lock().unwrap() += 1;
    state.post_bodies.lock().unwrap().push(body.clone());
    state.post_headers.lock().unwrap().push((
        headers
            .get("api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        headers
            .get("api-expires")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        headers
            .get("api-signature")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    ));

    let delay = *state.post_delay_ms.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }

    let failure = state.fail_posts_with.lock().unwrap().pop();
    if let Some(status) = failure {
        let mut response_headers = HeaderMap::new();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response_headers.insert("retry-after", "1".parse().unwrap());
        }
        return (
            status,
            response_headers,
            Json(json!({"error": {"message": "simulated", "name": "HTTPError"}})),
        )
            .into_response();
    }

    let order_id = state.order_id.lock().unwrap().clone();
    Json(order_ack(&order_id, &body)).into_response()
}

async fn handle_get_order(
    State(state): State<TestServerState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Response {
    *state.get_count.lock().unwrap() += 1;

    let row = state.reconcile_row.lock().unwrap().clone();
    match (params.get("clOrdID"), row) {
        (Some(_), Some(row)) => Json(json!([row])).into_response(),
        _ => Json(json!([])).into_response(),
    }
}

async fn handle_get_instruments(RawQuery(_query): RawQuery) -> Response {
    Json(json!([
        {
            "symbol": "XBTUSD",
            "state": "open",
            "lotSize": 100,
            "tickSize": 0.5,
            "markPrice": 60123.45,
        },
    ]))
    .into_response()
}

async fn start_server(state: TestServerState) -> SocketAddr {
    let app = Router::new()
        .route(
            "/order",
            axum::routing::post(handle_post_order).get(handle_get_order),
        )
        .route("/instrument/active", get(handle_get_instruments))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> BitmexClientConfig {
    BitmexClientConfig {
        api_key: Some("LAqUlngMIQkIUjXMUreyu3qn".to_string()),
        api_secret: Some("chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO".to_string()),
        base_url_http: Some(format!("http://{addr}")),
        http_timeout_secs: 5,
        order_timeout_ms: 500,
        ..Default::default()
    }
}

fn submitter_for(config: &BitmexClientConfig) -> (OrderSubmitter, Arc<StdMutex<BitmexState>>) {
    let state = Arc::new(StdMutex::new(BitmexState::default()));
    let http = BitmexHttpClient::new(config).unwrap();
    let submitter = OrderSubmitter::new(http, Arc::clone(&state), config, None);
    (submitter, state)
}

fn market_buy(cl_ord_id: &str) -> NormalizedPlaceInput {
    validate_place_input(&bitmex_hub::PlaceRequest {
        symbol: "XBTUSD".to_string(),
        side: BitmexSide::Buy,
        size: 100.0,
        price: None,
        order_type: BitmexOrderType::Market,
        opts: bitmex_hub::PlaceOptions {
            cl_ord_id: Some(cl_ord_id.to_string()),
            ..Default::default()
        },
        best_ask: None,
        best_bid: None,
    })
    .unwrap()
}

#[rstest]
#[tokio::test]
async fn test_market_buy_happy_path() {
    let server = TestServerState::new("ord-1");
    let addr = start_server(server.clone()).await;
    let (submitter, state) = submitter_for(&config_for(addr));

    let order = submitter.submit(market_buy("client-1")).await.unwrap();

    assert_eq!(order.order_id, Ustr::from("ord-1"));
    assert_eq!(order.status, OrderStatus::Placed);
    assert_eq!(server.post_count(), 1);

    // The POST body carries exactly the expected fields
    let bodies = server.post_bodies.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({
            "symbol": "XBTUSD",
            "side": "Buy",
            "orderQty": 100.0,
            "ordType": "Market",
            "clOrdID": "client-1"
        })
    );

    // The registry indexes the ack
    let state = state.lock().unwrap();
    let stored = state.orders.get_by_cl_ord_id("client-1").unwrap();
    assert_eq!(stored.order_id, Ustr::from("ord-1"));
    assert_eq!(stored.status, OrderStatus::Placed);
}

#[rstest]
#[tokio::test]
async fn test_signed_headers_attached() {
    let server = TestServerState::new("ord-1");
    let addr = start_server(server.clone()).await;
    let (submitter, _state) = submitter_for(&config_for(addr));

    submitter.submit(market_buy("client-sig")).await.unwrap();

    let headers = server.post_headers.lock().unwrap();
    let (key, expires, signature) = headers[0].clone();
    assert_eq!(key.as_deref(), Some("LAqUlngMIQkIUjXMUreyu3qn"));
    let expires: i64 = expires.unwrap().parse().unwrap();
    assert!(expires > chrono::Utc::now().timestamp());
    assert_eq!(signature.unwrap().len(), 64);
}

#[rstest]
#[tokio::test]
async fn test_retry_once_on_5xx() {
    let server = TestServerState::new("ord-2");
    let addr = start_server(server.clone()).await;
    server
        .fail_posts_with
        .lock()
        .unwrap()
        .push(StatusCode::SERVICE_UNAVAILABLE);
    let (submitter, _state) = submitter_for(&config_for(addr));

    let order = submitter.submit(market_buy("client-2")).await.unwrap();

    assert_eq!(order.order_id, Ustr::from("ord-2"));
    assert_eq!(server.post_count(), 2);
}

#[rstest]
#[tokio::test]
async fn test_no_retry_on_429_with_retry_hint() {
    let server = TestServerState::new("ord-3");
    let addr = start_server(server.clone()).await;
    server
        .fail_posts_with
        .lock()
        .unwrap()
        .push(StatusCode::TOO_MANY_REQUESTS);
    let (submitter, _state) = submitter_for(&config_for(addr));

    let err = submitter.submit(market_buy("client-3")).await.unwrap_err();

    assert_eq!(server.post_count(), 1);
    match err {
        BitmexError::RateLimit { retry_after_ms, .. } => {
            assert_eq!(retry_after_ms, Some(1_000));
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_no_retry_on_validation_4xx() {
    let server = TestServerState::new("ord-4");
    let addr = start_server(server.clone()).await;
    server
        .fail_posts_with
        .lock()
        .unwrap()
        .push(StatusCode::BAD_REQUEST);
    let (submitter, _state) = submitter_for(&config_for(addr));

    let err = submitter.submit(market_buy("client-4")).await.unwrap_err();

    assert_eq!(server.post_count(), 1);
    assert!(matches!(err, BitmexError::Validation { .. }));
}

#[rstest]
#[tokio::test]
async fn test_order_rejected_on_422() {
    let server = TestServerState::new("ord-5");
    let addr = start_server(server.clone()).await;
    server
        .fail_posts_with
        .lock()
        .unwrap()
        .push(StatusCode::UNPROCESSABLE_ENTITY);
    let (submitter, _state) = submitter_for(&config_for(addr));

    let err = submitter.submit(market_buy("client-5")).await.unwrap_err();
    assert!(matches!(err, BitmexError::OrderRejected { .. }));
}

#[rstest]
#[tokio::test]
async fn test_timeout_triggers_reconcile() {
    let server = TestServerState::new("ord-6");
    let addr = start_server(server.clone()).await;
    // POST stalls past the placement timeout; reconcile finds the order
    *server.post_delay_ms.lock().unwrap() = Some(2_000);
    *server.reconcile_row.lock().unwrap() = Some(json!({
        "orderID": "ord-6",
        "clOrdID": "client-6",
        "symbol": "XBTUSD",
        "side": "Buy",
        "orderQty": 100,
        "ordStatus": "New",
        "leavesQty": 100,
        "cumQty": 0,
        "timestamp": "2024-01-05T00:01:20.000Z",
    }));
    let (submitter, state) = submitter_for(&config_for(addr));

    let order = submitter.submit(market_buy("client-6")).await.unwrap();

    assert_eq!(order.order_id, Ustr::from("ord-6"));
    assert_eq!(*server.get_count.lock().unwrap(), 1);
    let state = state.lock().unwrap();
    assert!(state.orders.get_by_cl_ord_id("client-6").is_some());
}

#[rstest]
#[tokio::test]
async fn test_timeout_without_trace_surfaces_timeout() {
    let server = TestServerState::new("ord-7");
    let addr = start_server(server.clone()).await;
    *server.post_delay_ms.lock().unwrap() = Some(2_000);
    // No reconcile row and nothing observed via the stream
    let (submitter, _state) = submitter_for(&config_for(addr));

    let err = submitter.submit(market_buy("client-7")).await.unwrap_err();
    assert!(matches!(err, BitmexError::Timeout { .. }));
}

#[rstest]
#[tokio::test]
async fn test_duplicate_submissions_coalesce() {
    let server = TestServerState::new("ord-8");
    let addr = start_server(server.clone()).await;
    // Slow the ack down enough for the second submit to catch the first
    *server.post_delay_ms.lock().unwrap() = Some(100);
    let (submitter, _state) = submitter_for(&config_for(addr));

    let first = submitter.submit(market_buy("client-8"));
    let second = submitter.submit(market_buy("client-8"));
    let (first, second) = tokio::join!(first, second);

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.order_id, Ustr::from("ord-8"));
    assert_eq!(first, second);
    assert_eq!(server.post_count(), 1);
}

#[rstest]
#[tokio::test]
async fn test_instrument_bootstrap_rows() {
    let server = TestServerState::new("ord-9");
    let addr = start_server(server).await;
    let http = BitmexHttpClient::new(&config_for(addr)).unwrap();

    let instruments = http.get_instruments(true).await.unwrap();
    assert_eq!(instruments.len(), 1);
    assert_eq!(instruments[0].symbol, Ustr::from("XBTUSD"));
    assert_eq!(instruments[0].tick_size, Some(0.5));
}
