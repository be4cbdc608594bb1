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

//! Integration tests for the BitMEX WebSocket client using a mock server.

use std::net::SocketAddr;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use bitmex_hub::{
    BitmexAuthReason, BitmexClientConfig, BitmexWsError,
    websocket::client::{BitmexWebSocketClient, ConnectionState},
};
use rstest::rstest;
use serde_json::{Value, json};
use ustr::Ustr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuthMode {
    Success,
    Reject,
    Ignore,
}

#[derive(Clone)]
struct TestServerState {
    auth_mode: Arc<Mutex<AuthMode>>,
    auth_reject_reason: Arc<Mutex<String>>,
    /// Raw text frames, one vector per connection.
    messages: Arc<Mutex<Vec<Vec<String>>>>,
    auth_calls: Arc<Mutex<usize>>,
    /// Close the first connection once it receives a private subscribe.
    close_first_on_private_sub: Arc<AtomicBool>,
}

impl Default for TestServerState {
    fn default() -> Self {
        Self {
            auth_mode: Arc::new(Mutex::new(AuthMode::Success)),
            auth_reject_reason: Arc::new(Mutex::new("Signature not valid.".to_string())),
            messages: Arc::new(Mutex::new(Vec::new())),
            auth_calls: Arc::new(Mutex::new(0)),
            close_first_on_private_sub: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TestServerState {
    fn connection_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    fn connection_messages(&self, index: usize) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    fn count_frames_containing(&self, index: usize, needle: &str) -> usize {
        self.connection_messages(index)
            .iter()
            .filter(|raw| raw.contains(needle))
            .count()
    }
}

async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<TestServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: TestServerState) {
    let connection_index = {
        let mut messages = state.messages.lock().unwrap();
        messages.push(Vec::new());
        messages.len() - 1
    };

    let welcome = json!({
        "info": "Welcome to the BitMEX Realtime API.",
        "version": "2.0",
        "timestamp": "2024-01-05T00:01:20.000Z",
        "docs": "https://www.bitmex.com/app/wsAPI",
        "limit": {"remaining": 38},
    });
    if socket
        .send(Message::Text(welcome.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let raw = text.to_string();
        state.messages.lock().unwrap()[connection_index].push(raw.clone());

        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        match value.get("op").and_then(Value::as_str) {
            Some("authKeyExpires") => {
                *state.auth_calls.lock().unwrap() += 1;
                let mode = *state.auth_mode.lock().unwrap();
                let reply = match mode {
                    AuthMode::Success => json!({
                        "success": true,
                        "request": {"op": "authKeyExpires", "args": []},
                    }),
                    AuthMode::Reject => json!({
                        "status": 401,
                        "error": *state.auth_reject_reason.lock().unwrap(),
                        "request": {"op": "authKeyExpires", "args": []},
                    }),
                    AuthMode::Ignore => continue,
                };
                if socket
                    .send(Message::Text(reply.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Some("subscribe") | Some("unsubscribe") => {
                let private = raw.contains("position")
                    || raw.contains("wallet")
                    || raw.contains("\"order\"")
                    || raw.contains("margin");
                for arg in value
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                {
                    let reply = json!({
                        "success": true,
                        "subscribe": arg,
                        "request": {"op": value.get("op"), "args": [arg]},
                    });
                    if socket
                        .send(Message::Text(reply.to_string().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    // A trade subscription gets a snapshot row, like the venue
                    if arg == "trade:XBTUSD" {
                        let snapshot = json!({
                            "table": "trade",
                            "action": "partial",
                            "data": [{
                                "timestamp": "2024-01-05T00:01:20.000Z",
                                "symbol": "XBTUSD",
                                "side": "Buy",
                                "size": 100,
                                "price": 60000.5,
                            }],
                        });
                        if socket
                            .send(Message::Text(snapshot.to_string().into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                if private
                    && connection_index == 0
                    && state.close_first_on_private_sub.load(Ordering::SeqCst)
                {
                    state
                        .close_first_on_private_sub
                        .store(false, Ordering::SeqCst);
                    // Drop without a close frame: an abnormal loss
                    return;
                }
            }
            _ => {}
        }
    }
}

async fn start_server(state: TestServerState) -> SocketAddr {
    let app = Router::new()
        .route("/realtime", get(handle_upgrade))
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
        api_key: Some("key".to_string()),
        api_secret: Some("secret".to_string()),
        base_url_ws: Some(format!("ws://{addr}/realtime")),
        reconnect_delay_initial_ms: 50,
        reconnect_delay_max_ms: 200,
        reconnect_max_attempts: 5,
        auth_timeout_ms: 1_000,
        ping_interval_ms: 25_000,
        pong_timeout_ms: 15_000,
        ..Default::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[rstest]
#[tokio::test]
async fn test_connect_and_public_subscribe() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Open);

    client.subscribe(vec![Ustr::from("trade:XBTUSD")]).unwrap();

    assert!(
        wait_until(
            || server.count_frames_containing(0, "trade:XBTUSD") == 1,
            Duration::from_secs(2),
        )
        .await
    );

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_login_success() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    let ts = client.login().await.unwrap();

    assert!(ts <= chrono::Utc::now());
    assert_eq!(*server.auth_calls.lock().unwrap(), 1);

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_login_bad_credentials_classified() {
    let server = TestServerState::default();
    *server.auth_mode.lock().unwrap() = AuthMode::Reject;
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    let err = client.login().await.unwrap_err();

    assert!(matches!(
        err,
        BitmexWsError::AuthenticationError {
            reason: BitmexAuthReason::BadCredentials,
            ..
        }
    ));

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_login_clock_skew_classified() {
    let server = TestServerState::default();
    *server.auth_mode.lock().unwrap() = AuthMode::Reject;
    *server.auth_reject_reason.lock().unwrap() = "Timestamp expired".to_string();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    let err = client.login().await.unwrap_err();

    assert!(matches!(
        err,
        BitmexWsError::AuthenticationError {
            reason: BitmexAuthReason::ClockSkew,
            ..
        }
    ));

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_login_timeout() {
    let server = TestServerState::default();
    *server.auth_mode.lock().unwrap() = AuthMode::Ignore;
    let addr = start_server(server.clone()).await;
    let mut config = config_for(addr);
    config.auth_timeout_ms = 100;
    let mut client = BitmexWebSocketClient::new(&config, None).unwrap();

    let _events = client.connect().await.unwrap();
    let err = client.login().await.unwrap_err();

    assert!(matches!(
        err,
        BitmexWsError::AuthenticationError {
            reason: BitmexAuthReason::Timeout,
            ..
        }
    ));

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_concurrent_login_rejected() {
    let server = TestServerState::default();
    *server.auth_mode.lock().unwrap() = AuthMode::Ignore;
    let addr = start_server(server.clone()).await;
    let mut config = config_for(addr);
    config.auth_timeout_ms = 300;
    let mut client = BitmexWebSocketClient::new(&config, None).unwrap();

    let _events = client.connect().await.unwrap();

    let first = client.login();
    let second = client.login();
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_err());
    let in_progress = matches!(second, Err(BitmexWsError::AuthenticationInProgress));
    assert!(in_progress, "expected in-progress rejection: {second:?}");

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_private_subscribe_gated_until_authed() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();

    // Private frames buffer while unauthenticated; duplicates drop silently
    client.subscribe(vec![Ustr::from("position")]).unwrap();
    client.subscribe(vec![Ustr::from("position")]).unwrap();
    client.subscribe(vec![Ustr::from("trade:XBTUSD")]).unwrap();

    assert!(
        wait_until(
            || server.count_frames_containing(0, "trade:XBTUSD") == 1,
            Duration::from_secs(2),
        )
        .await
    );
    assert_eq!(server.count_frames_containing(0, "position"), 0);

    client.login().await.unwrap();

    assert!(
        wait_until(
            || server.count_frames_containing(0, "position") == 1,
            Duration::from_secs(2),
        )
        .await
    );
    // The duplicate never went out
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.count_frames_containing(0, "position"), 1);

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_subscribe_before_connect_is_buffered() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    // Submitted while disconnected
    client.subscribe(vec![Ustr::from("trade:XBTUSD")]).unwrap();

    let _events = client.connect().await.unwrap();

    assert!(
        wait_until(
            || server.count_frames_containing(0, "trade:XBTUSD") == 1,
            Duration::from_secs(2),
        )
        .await
    );
    // Transmitted at most once
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.count_frames_containing(0, "trade:XBTUSD"), 1);

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_reconnect_relogin_and_private_resubscribe() {
    let server = TestServerState::default();
    server
        .close_first_on_private_sub
        .store(true, Ordering::SeqCst);
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    client.login().await.unwrap();

    // This private subscribe is tracked, then the server drops the socket
    client.subscribe(vec![Ustr::from("position")]).unwrap();

    assert!(
        wait_until(|| server.connection_count() == 2, Duration::from_secs(5)).await,
        "expected a reconnect",
    );

    // The fresh connection re-authenticates, then restores the subscription
    assert!(
        wait_until(
            || server.count_frames_containing(1, "authKeyExpires") == 1
                && server.count_frames_containing(1, "position") >= 1,
            Duration::from_secs(5),
        )
        .await,
        "expected relogin and resubscribe on the new connection",
    );

    let messages = server.connection_messages(1);
    let auth_index = messages
        .iter()
        .position(|raw| raw.contains("authKeyExpires"))
        .unwrap();
    let sub_index = messages
        .iter()
        .position(|raw| raw.contains("position"))
        .unwrap();
    assert!(auth_index < sub_index, "auth must precede the resubscribe");

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_keepalive_pings_keep_connection_open() {
    let server = TestServerState::default();
    let addr = start_server(server).await;
    let mut config = config_for(addr);
    config.ping_interval_ms = 50;
    config.pong_timeout_ms = 500;
    let mut client = BitmexWebSocketClient::new(&config, None).unwrap();

    let _events = client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(client.connection_state(), ConnectionState::Open);

    client.disconnect();
}

#[rstest]
#[tokio::test]
async fn test_manual_disconnect_suppresses_reconnect() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let _events = client.connect().await.unwrap();
    client.disconnect();

    assert!(
        wait_until(
            || client.connection_state() == ConnectionState::Idle,
            Duration::from_secs(2),
        )
        .await
    );

    // No second connection appears
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connection_count(), 1);
}

#[rstest]
#[tokio::test]
async fn test_table_frames_reach_the_consumer() {
    let server = TestServerState::default();
    let addr = start_server(server.clone()).await;
    let mut client = BitmexWebSocketClient::new(&config_for(addr), None).unwrap();

    let mut events = client.connect().await.unwrap();

    client.subscribe(vec![Ustr::from("trade:XBTUSD")]).unwrap();

    let got_table = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = events.recv().await {
            if let bitmex_hub::websocket::client::WsEvent::Message(
                bitmex_hub::websocket::messages::BitmexWsMessage::Table(
                    bitmex_hub::websocket::messages::BitmexTableMessage::Trade { data, .. },
                ),
            ) = event
            {
                return data.len() == 1 && data[0].price == 60_000.5;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(got_table, "expected the trade snapshot to reach the consumer");

    client.disconnect();
}
