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

//! WebSocket client for the [BitMEX](https://bitmex.com) real-time API.
//!
//! The client owns a single event-loop task driving the socket lifecycle:
//! connect, exponential-backoff reconnect, ping/pong keepalive, graceful
//! close, and the authentication sub-state machine with automatic re-login
//! and private-channel resubscription after a reconnect.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU8, Ordering},
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::frame::coding::CloseCode},
};

use super::{
    auth::{AuthState, AuthTracker},
    buffer::{Dispatch, OutboundBuffer},
    enums::{AuthSource, BitmexWsAuthAction, BitmexWsOperation},
    error::BitmexWsError,
    messages::{BitmexAuthentication, BitmexSubscription, BitmexWsMessage},
};
use crate::{
    common::{
        credential::Credential,
        metrics::{self, MetricsSink, NoopMetrics},
    },
    config::BitmexClientConfig,
    error::{BitmexAuthReason, classify_auth_reason},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket lifecycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no task.
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Socket established.
    Open,
    /// Graceful close requested.
    Closing,
    /// Waiting out the backoff delay before reopening.
    Reconnecting,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            4 => Self::Reconnecting,
            _ => Self::Idle,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
            Self::Reconnecting => 4,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Event delivered to the consumer of the transport.
#[derive(Debug)]
pub enum WsEvent {
    /// A parsed inbound frame.
    Message(BitmexWsMessage),
    /// The socket re-opened after a loss; private tables need fresh snapshots.
    Reconnected,
    /// An authentication attempt succeeded.
    AuthSucceeded { source: AuthSource },
    /// An authentication attempt failed with a classified reason.
    AuthFailed {
        source: AuthSource,
        reason: BitmexAuthReason,
        message: String,
    },
    /// The socket closed normally (code 1000); not retried.
    Closed,
    /// Reconnection gave up; the transport is dead until `connect` is called again.
    Terminated { message: String },
}

enum WsCommand {
    Send(String),
    Close,
}

/// Why the inner read loop ended.
enum LoopExit {
    Manual,
    NormalClose,
    Abnormal(String),
}

/// Provides a WebSocket client for the [BitMEX](https://bitmex.com) real-time API.
#[derive(Clone)]
pub struct BitmexWebSocketClient {
    url: String,
    credential: Option<Credential>,
    config: BitmexClientConfig,
    connection: Arc<ConnectionStateCell>,
    auth: AuthTracker,
    buffer: Arc<Mutex<OutboundBuffer>>,
    metrics: Arc<dyn MetricsSink>,
    cmd_tx: Arc<Mutex<Option<mpsc::UnboundedSender<WsCommand>>>>,
}

impl std::fmt::Debug for BitmexWebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BitmexWebSocketClient))
            .field("url", &self.url)
            .field("state", &self.connection.get())
            .finish()
    }
}

impl BitmexWebSocketClient {
    /// Creates a new [`BitmexWebSocketClient`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of `api_key`/`api_secret` is configured.
    pub fn new(
        config: &BitmexClientConfig,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> anyhow::Result<Self> {
        let credential = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(Credential::new(key.clone(), secret.clone())),
            (None, None) => None,
            _ => anyhow::bail!("Both `api_key` and `api_secret` must be provided together"),
        };

        Ok(Self {
            url: config.ws_url(),
            credential,
            config: config.clone(),
            connection: Arc::new(ConnectionStateCell::default()),
            auth: AuthTracker::new(),
            buffer: Arc::new(Mutex::new(OutboundBuffer::new(config.send_buffer_limit))),
            metrics: metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            cmd_tx: Arc::new(Mutex::new(None)),
        })
    }

    /// Current socket lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get()
    }

    /// Current authentication sub-state.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    /// Returns `true` while the socket is established.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.get() == ConnectionState::Open
    }

    /// Connects and spawns the event-loop task.
    ///
    /// Resolves once the first socket is established, returning the inbound
    /// event stream. A manual `disconnect` while connecting resolves this
    /// with a cancellation error.
    ///
    /// # Errors
    ///
    /// Returns an error if already connected, if the first connection cannot
    /// be established within the reconnect budget, or if canceled.
    pub async fn connect(&mut self) -> Result<mpsc::UnboundedReceiver<WsEvent>, BitmexWsError> {
        if self.connection.get() != ConnectionState::Idle {
            return Err(BitmexWsError::ClientError("Already connected".to_string()));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = oneshot::channel();

        *self
            .cmd_tx
            .lock()
            .expect("command sender lock poisoned") = Some(cmd_tx);

        self.connection.set(ConnectionState::Connecting);

        let mut task = EventLoop {
            url: self.url.clone(),
            credential: self.credential.clone(),
            config: self.config.clone(),
            connection: Arc::clone(&self.connection),
            auth: self.auth.clone(),
            buffer: Arc::clone(&self.buffer),
            metrics: Arc::clone(&self.metrics),
            event_tx,
            cmd_rx,
            connected_tx: Some(connected_tx),
            ever_opened: false,
        };
        tokio::spawn(async move { task.run().await });

        match connected_rx.await {
            Ok(Ok(())) => Ok(event_rx),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BitmexWsError::ConnectCanceled(
                "event loop ended before the socket opened".to_string(),
            )),
        }
    }

    /// Requests a graceful close; reconnect is suppressed and timers are
    /// canceled.
    pub fn disconnect(&self) {
        self.connection.set(ConnectionState::Closing);
        self.command(WsCommand::Close);
    }

    /// Authenticates the connection with an `authKeyExpires` request.
    ///
    /// Exactly one attempt may be in flight; concurrent attempts fail.
    ///
    /// # Errors
    ///
    /// Returns the classified failure: credentials missing, socket closed,
    /// a server-side rejection, or the auth timeout.
    pub async fn login(&self) -> Result<chrono::DateTime<chrono::Utc>, BitmexWsError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(BitmexWsError::MissingCredentials)?;

        if !self.is_open() {
            return Err(BitmexWsError::AuthenticationError {
                reason: BitmexAuthReason::Network,
                message: "Socket is not open".to_string(),
            });
        }

        self.auth.begin(AuthSource::Manual)?;

        let raw = build_auth_payload(credential, self.config.auth_expires_skew_secs)?;
        self.command(WsCommand::Send(raw));

        self.auth
            .wait_for_result(Duration::from_millis(self.config.auth_timeout_ms))
            .await?;
        Ok(chrono::Utc::now())
    }

    /// Subscribes to the given topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be serialized or the send buffer
    /// is full.
    pub fn subscribe(&self, topics: Vec<ustr::Ustr>) -> Result<(), BitmexWsError> {
        self.send_channel_op(BitmexWsOperation::Subscribe, topics)
    }

    /// Unsubscribes from the given topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be serialized or the send buffer
    /// is full.
    pub fn unsubscribe(&self, topics: Vec<ustr::Ustr>) -> Result<(), BitmexWsError> {
        self.send_channel_op(BitmexWsOperation::Unsubscribe, topics)
    }

    /// Unsubscribes then resubscribes a topic, forcing a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if either frame cannot be dispatched.
    pub fn resubscribe(&self, topic: ustr::Ustr) -> Result<(), BitmexWsError> {
        self.unsubscribe(vec![topic])?;
        self.subscribe(vec![topic])
    }

    fn send_channel_op(
        &self,
        op: BitmexWsOperation,
        topics: Vec<ustr::Ustr>,
    ) -> Result<(), BitmexWsError> {
        let payload = BitmexSubscription { op, args: topics };
        let raw = serde_json::to_string(&payload)?;
        self.send_raw(raw)
    }

    /// Dispatches a raw frame through the outbound buffer policy.
    fn send_raw(&self, raw: String) -> Result<(), BitmexWsError> {
        let open = self.is_open();
        let authed = self.auth.is_authed();
        let dispatch = {
            let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
            buffer.prepare(raw, open, authed)?
        };
        if let Dispatch::Send(frame) = dispatch {
            self.command(WsCommand::Send(frame.raw));
        }
        Ok(())
    }

    fn command(&self, command: WsCommand) {
        let guard = self.cmd_tx.lock().expect("command sender lock poisoned");
        if let Some(tx) = guard.as_ref() {
            if tx.send(command).is_err() {
                tracing::debug!("Event loop is gone; command dropped");
            }
        } else {
            tracing::debug!("Not connected; command dropped");
        }
    }
}

fn build_auth_payload(
    credential: &Credential,
    skew_secs: i64,
) -> Result<String, BitmexWsError> {
    let (expires, signature) = credential.sign_ws_auth(skew_secs);
    let payload = BitmexAuthentication {
        op: BitmexWsAuthAction::AuthKeyExpires,
        args: (credential.api_key.to_string(), expires, signature),
    };
    Ok(serde_json::to_string(&payload)?)
}

/// Single task owning the socket, its timers and the auth sub-state machine.
struct EventLoop {
    url: String,
    credential: Option<Credential>,
    config: BitmexClientConfig,
    connection: Arc<ConnectionStateCell>,
    auth: AuthTracker,
    buffer: Arc<Mutex<OutboundBuffer>>,
    metrics: Arc<dyn MetricsSink>,
    event_tx: mpsc::UnboundedSender<WsEvent>,
    cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    connected_tx: Option<oneshot::Sender<Result<(), BitmexWsError>>>,
    ever_opened: bool,
}

impl EventLoop {
    async fn run(&mut self) {
        let mut attempt: u32 = 0;

        loop {
            if self.connection.get() == ConnectionState::Closing {
                break;
            }

            match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str())).await {
                Ok(Ok((stream, _response))) => {
                    attempt = 0;
                    self.connection.set(ConnectionState::Open);
                    tracing::info!(url = self.url, "Socket open");

                    if let Some(tx) = self.connected_tx.take() {
                        let _ = tx.send(Ok(()));
                    }

                    let reconnected = self.ever_opened;
                    self.ever_opened = true;
                    if reconnected {
                        let _ = self.event_tx.send(WsEvent::Reconnected);
                    }

                    match self.drive_socket(stream, reconnected).await {
                        LoopExit::Manual => break,
                        LoopExit::NormalClose => {
                            tracing::info!("Socket closed normally (1000); not reconnecting");
                            self.auth.on_socket_loss();
                            let _ = self.event_tx.send(WsEvent::Closed);
                            break;
                        }
                        LoopExit::Abnormal(reason) => {
                            tracing::warn!(reason, "Socket lost");
                            self.auth.on_socket_loss();
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Connect failed");
                }
                Err(_) => {
                    tracing::warn!("Connect timed out");
                }
            }

            if self.connection.get() == ConnectionState::Closing {
                break;
            }

            attempt += 1;
            if attempt > self.config.reconnect_max_attempts {
                let message = format!(
                    "gave up after {} reconnect attempts",
                    self.config.reconnect_max_attempts
                );
                tracing::error!(message);
                if let Some(tx) = self.connected_tx.take() {
                    let _ = tx.send(Err(BitmexWsError::ReconnectExhausted {
                        attempts: self.config.reconnect_max_attempts,
                        message: message.clone(),
                    }));
                }
                let _ = self.event_tx.send(WsEvent::Terminated { message });
                break;
            }

            let delay = reconnect_delay(
                attempt,
                self.config.reconnect_delay_initial_ms,
                self.config.reconnect_delay_max_ms,
            );
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.connection.set(ConnectionState::Reconnecting);

            // Sleep out the backoff but stay responsive to a manual close
            let deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(WsCommand::Close) | None => {
                            self.finish_closed();
                            return;
                        }
                        Some(WsCommand::Send(raw)) => self.buffer_frame(raw),
                    },
                }
            }
        }

        self.finish_closed();
    }

    fn finish_closed(&mut self) {
        self.connection.set(ConnectionState::Idle);
        self.auth.on_socket_loss();
        if let Some(tx) = self.connected_tx.take() {
            let _ = tx.send(Err(BitmexWsError::ConnectCanceled(
                "disconnect requested".to_string(),
            )));
        }
        tracing::debug!("Event loop stopped");
    }

    /// Runs the open-socket select loop until the socket is lost or closed.
    async fn drive_socket(&mut self, mut stream: WsStream, reconnected: bool) -> LoopExit {
        let ping_period = Duration::from_millis(self.config.ping_interval_ms);
        let mut ping_interval = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut pong_deadline: Option<Instant> = None;
        let mut auth_deadline: Option<Instant> = None;
        let mut auth_retry_at: Option<Instant> = None;

        if reconnected
            && let Some(raw) = self.maybe_relogin()
        {
            if let Err(e) = stream.send(Message::Text(raw.into())).await {
                return LoopExit::Abnormal(format!("relogin send failed: {e}"));
            }
            auth_deadline =
                Some(Instant::now() + Duration::from_millis(self.config.auth_timeout_ms));
        }

        self.flush_buffer(&mut stream).await;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(WsCommand::Send(raw)) => {
                        if is_auth_payload(&raw) {
                            auth_deadline = Some(
                                Instant::now() + Duration::from_millis(self.config.auth_timeout_ms),
                            );
                        }
                        if let Err(e) = stream.send(Message::Text(raw.clone().into())).await {
                            tracing::warn!(error = %e, "Send failed; buffering frame");
                            self.buffer_frame(raw);
                            return LoopExit::Abnormal(e.to_string());
                        }
                    }
                    Some(WsCommand::Close) | None => {
                        let _ = stream.send(Message::Close(None)).await;
                        let _ = stream.close(None).await;
                        return LoopExit::Manual;
                    }
                },
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "pong" {
                            pong_deadline = None;
                            continue;
                        }
                        self.handle_text(text.as_str(), &mut auth_deadline, &mut auth_retry_at, &mut stream).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = stream.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let normal = frame
                            .as_ref()
                            .is_some_and(|f| f.code == CloseCode::Normal);
                        if self.connection.get() == ConnectionState::Closing {
                            return LoopExit::Manual;
                        }
                        if normal {
                            return LoopExit::NormalClose;
                        }
                        let reason = frame
                            .map(|f| format!("close code {}", u16::from(f.code)))
                            .unwrap_or_else(|| "close without frame".to_string());
                        return LoopExit::Abnormal(reason);
                    }
                    Some(Ok(other)) => {
                        tracing::debug!("Ignoring frame: {other:?}");
                    }
                    Some(Err(e)) => return LoopExit::Abnormal(e.to_string()),
                    None => return LoopExit::Abnormal("stream ended".to_string()),
                },
                _ = ping_interval.tick() => {
                    if let Err(e) = stream.send(Message::Ping(Vec::new().into())).await {
                        return LoopExit::Abnormal(format!("ping failed: {e}"));
                    }
                    // Arm the deadline on every ping; any pong extends it
                    pong_deadline = Some(
                        Instant::now() + Duration::from_millis(self.config.pong_timeout_ms),
                    );
                }
                _ = sleep_until_opt(pong_deadline), if pong_deadline.is_some() => {
                    return LoopExit::Abnormal("pong deadline elapsed".to_string());
                }
                _ = sleep_until_opt(auth_deadline), if auth_deadline.is_some() => {
                    auth_deadline = None;
                    if self.auth.state() == AuthState::Authing {
                        let source = self.auth.source().unwrap_or(AuthSource::Reconnect);
                        self.auth.fail(BitmexAuthReason::Timeout, "Authentication timed out");
                        self.report_auth_failure(
                            source,
                            BitmexAuthReason::Timeout,
                            "Authentication timed out",
                            &mut auth_retry_at,
                        );
                    }
                }
                _ = sleep_until_opt(auth_retry_at), if auth_retry_at.is_some() => {
                    auth_retry_at = None;
                    if let Some(raw) = self.maybe_relogin() {
                        if let Err(e) = stream.send(Message::Text(raw.into())).await {
                            return LoopExit::Abnormal(format!("relogin send failed: {e}"));
                        }
                        auth_deadline = Some(
                            Instant::now() + Duration::from_millis(self.config.auth_timeout_ms),
                        );
                    }
                }
            }
        }
    }

    /// Parses and routes one inbound text frame.
    async fn handle_text(
        &mut self,
        text: &str,
        auth_deadline: &mut Option<Instant>,
        auth_retry_at: &mut Option<Instant>,
        stream: &mut WsStream,
    ) {
        let msg: BitmexWsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, text, "Unparseable frame");
                return;
            }
        };

        match &msg {
            BitmexWsMessage::Welcome { version, limit, .. } => {
                tracing::info!(
                    version,
                    rate_limit = limit.as_ref().and_then(|l| l.remaining),
                    "Welcome to the BitMEX Realtime API",
                );
            }
            BitmexWsMessage::Subscription {
                success, request, ..
            } if request.as_ref().is_some_and(|r| r.is_auth()) => {
                *auth_deadline = None;
                if *success {
                    self.on_auth_success(stream).await;
                } else {
                    self.on_auth_failure("authentication refused", auth_retry_at);
                }
                return;
            }
            BitmexWsMessage::Subscription {
                success, subscribe, ..
            } => {
                if let Some(topic) = subscribe {
                    tracing::debug!(topic, success, "Subscription ack");
                }
            }
            BitmexWsMessage::Error {
                status,
                error,
                request,
            } => {
                if request.as_ref().is_some_and(|r| r.is_auth()) {
                    *auth_deadline = None;
                    let detail = error.clone();
                    self.on_auth_failure(&detail, auth_retry_at);
                    return;
                }
                tracing::error!(status = status.unwrap_or(0), error, "Venue error");
            }
            BitmexWsMessage::Table(_) => {}
        }

        let _ = self.event_tx.send(WsEvent::Message(msg));
    }

    async fn on_auth_success(&mut self, stream: &mut WsStream) {
        let source = self.auth.source().unwrap_or(AuthSource::Manual);
        if let Some(latency) = self.auth.elapsed_ms() {
            self.metrics
                .observe_histogram(metrics::AUTH_LATENCY_MS, latency, &[]);
        }
        self.metrics
            .increment_counter(metrics::AUTH_SUCCESS_TOTAL, 1, &[]);
        self.auth.succeed();
        tracing::info!(source = %source, "Authenticated");
        let _ = self.event_tx.send(WsEvent::AuthSucceeded { source });

        self.flush_buffer(stream).await;

        if source == AuthSource::Reconnect {
            let topics = {
                let buffer = self.buffer.lock().expect("send buffer lock poisoned");
                buffer.private_subscriptions()
            };
            if !topics.is_empty() {
                tracing::info!(count = topics.len(), "Restoring private subscriptions");
                let payload = BitmexSubscription {
                    op: BitmexWsOperation::Subscribe,
                    args: topics,
                };
                match serde_json::to_string(&payload) {
                    Ok(raw) => {
                        if let Err(e) = stream.send(Message::Text(raw.into())).await {
                            tracing::warn!(error = %e, "Resubscribe send failed");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Resubscribe payload failed"),
                }
            }
        }
    }

    fn on_auth_failure(&mut self, detail: &str, auth_retry_at: &mut Option<Instant>) {
        let source = self.auth.source().unwrap_or(AuthSource::Manual);
        let reason = classify_auth_reason(detail);

        if reason == BitmexAuthReason::AlreadyAuthed {
            // The venue confirms an authenticated connection; treat as success
            self.auth.succeed();
            self.metrics
                .increment_counter(metrics::AUTH_SUCCESS_TOTAL, 1, &[]);
            let _ = self.event_tx.send(WsEvent::AuthSucceeded { source });
            return;
        }

        self.auth.fail(reason, detail);
        self.report_auth_failure(source, reason, detail, auth_retry_at);
    }

    fn report_auth_failure(
        &mut self,
        source: AuthSource,
        reason: BitmexAuthReason,
        detail: &str,
        auth_retry_at: &mut Option<Instant>,
    ) {
        self.metrics.increment_counter(
            metrics::AUTH_ERROR_TOTAL,
            1,
            &[("reason", reason.as_ref())],
        );
        tracing::error!(source = %source, reason = %reason, detail, "Authentication failed");
        let _ = self.event_tx.send(WsEvent::AuthFailed {
            source,
            reason,
            message: detail.to_string(),
        });

        // Transient failures on the reconnect path retry on their own schedule
        if source == AuthSource::Reconnect
            && matches!(reason, BitmexAuthReason::Timeout | BitmexAuthReason::Network)
        {
            let delay = self.auth.next_retry_delay(
                self.config.reconnect_delay_initial_ms,
                self.config.reconnect_delay_max_ms,
            );
            tracing::warn!(delay_ms = delay.as_millis() as u64, "Scheduling auth retry");
            *auth_retry_at = Some(Instant::now() + delay);
        }
    }

    /// Builds a re-login payload when policy and credentials allow.
    fn maybe_relogin(&mut self) -> Option<String> {
        if !self.auth.should_relogin() {
            return None;
        }
        let credential = self.credential.as_ref()?;
        self.auth.begin(AuthSource::Reconnect).ok()?;

        match build_auth_payload(credential, self.config.auth_expires_skew_secs) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::error!(error = %e, "Auth payload failed");
                self.auth.fail(BitmexAuthReason::Network, e.to_string());
                None
            }
        }
    }

    fn buffer_frame(&self, raw: String) {
        let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
        match buffer.prepare(raw, false, false) {
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Dropping frame"),
        }
    }

    /// Flushes buffered frames in order.
    ///
    /// Frames still gated on authentication are re-appended; a send failure
    /// re-appends the remainder and aborts the flush.
    async fn flush_buffer(&mut self, stream: &mut WsStream) {
        let authed = self.auth.is_authed();
        let pending = {
            let buffer = self.buffer.lock().expect("send buffer lock poisoned");
            buffer.len()
        };

        for _ in 0..pending {
            let frame = {
                let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
                buffer.pop_front()
            };
            let Some(frame) = frame else { break };

            if frame.requires_auth && !authed {
                let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
                buffer.requeue_back(frame);
                continue;
            }

            if let Err(e) = stream.send(Message::Text(frame.raw.clone().into())).await {
                tracing::warn!(error = %e, "Flush aborted");
                let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
                buffer.requeue_front(frame);
                return;
            }
            let mut buffer = self.buffer.lock().expect("send buffer lock poisoned");
            buffer.mark_sent(&frame);
        }
    }
}

fn is_auth_payload(raw: &str) -> bool {
    raw.contains("\"authKeyExpires\"")
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Backoff delay for the given 1-based attempt: `min(base * 2^(attempt-1), max)`.
fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1_u64 << exponent).min(max_ms))
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
