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

//! High-level client wiring the transport, the applicator and the order
//! gateway over one shared state.
//!
//! The WebSocket delivers frames to a single applicator task (the only
//! writer besides REST completions, serialized through one lock); entity
//! diffs reach subscribers registered on the state's publishers.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use ustr::Ustr;

use crate::{
    common::{
        enums::BitmexSide,
        metrics::{MetricsSink, NoopMetrics},
        symbol::BitmexSymbolMap,
    },
    config::BitmexClientConfig,
    error::BitmexError,
    events::UpdateReason,
    execution::{
        NormalizedPlaceInput, OrderSubmitter, PlaceOptions, PlaceRequest, validate_place_input,
    },
    http::{client::BitmexHttpClient, models::BitmexHttpInstrument, query::PutOrderParams},
    state::{
        BitmexState, StateSummary,
        book::BookLevelView,
        instrument::Instrument,
        order::Order,
        position::Position,
        wallet::Wallet,
    },
    websocket::{
        client::{BitmexWebSocketClient, ConnectionState, WsEvent},
        messages::{BitmexInstrumentMsg, BitmexWsMessage},
    },
};

/// The BitMEX hub client: a locally consistent view of exchange state plus
/// order placement, amendment and cancellation.
#[derive(Debug)]
pub struct BitmexClient {
    config: BitmexClientConfig,
    ws: BitmexWebSocketClient,
    http: BitmexHttpClient,
    state: Arc<Mutex<BitmexState>>,
    submitter: OrderSubmitter,
    apply_task: Option<tokio::task::JoinHandle<()>>,
}

impl BitmexClient {
    /// Creates a new [`BitmexClient`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are half-configured or the HTTP client
    /// cannot be built.
    pub fn new(
        config: BitmexClientConfig,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> anyhow::Result<Self> {
        let metrics = metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let symbol_map = Arc::new(BitmexSymbolMap::new(config.symbol_mapping_enabled));

        let state = Arc::new(Mutex::new(BitmexState::new(
            Some(symbol_map),
            Some(Arc::clone(&metrics)),
        )));
        let ws = BitmexWebSocketClient::new(&config, Some(Arc::clone(&metrics)))?;
        let http = BitmexHttpClient::new(&config)?;
        let submitter = OrderSubmitter::new(
            http.clone(),
            Arc::clone(&state),
            &config,
            Some(metrics),
        );

        Ok(Self {
            config,
            ws,
            http,
            state,
            submitter,
            apply_task: None,
        })
    }

    /// Creates a client from environment-provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment credentials are half-configured.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(BitmexClientConfig::from_env(), None)
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &BitmexClientConfig {
        &self.config
    }

    /// Shared state handle, for advanced integrations and tests.
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<BitmexState>> {
        Arc::clone(&self.state)
    }

    /// Current transport state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.ws.connection_state()
    }

    /// Connects the WebSocket and starts the applicator task.
    ///
    /// # Errors
    ///
    /// Returns an error if already connected or the socket cannot be
    /// established.
    pub async fn connect(&mut self) -> Result<(), BitmexError> {
        let events = self.ws.connect().await.map_err(BitmexError::from)?;
        self.spawn_apply_task(events);
        Ok(())
    }

    fn spawn_apply_task(&mut self, mut events: mpsc::UnboundedReceiver<WsEvent>) {
        let state = Arc::clone(&self.state);
        let ws = self.ws.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    WsEvent::Message(BitmexWsMessage::Table(msg)) => {
                        let resubscribe = {
                            let mut state = state.lock().expect("state lock poisoned");
                            state.apply(&msg)
                        };
                        for topic in resubscribe {
                            if let Err(e) = ws.resubscribe(topic) {
                                tracing::warn!(%topic, error = %e, "Resubscribe failed");
                            }
                        }
                    }
                    WsEvent::Message(_) => {}
                    WsEvent::Reconnected => {
                        let mut state = state.lock().expect("state lock poisoned");
                        state.on_reconnect();
                    }
                    WsEvent::AuthSucceeded { source } => {
                        tracing::debug!(source = %source, "Transport authenticated");
                    }
                    WsEvent::AuthFailed {
                        source,
                        reason,
                        message,
                    } => {
                        tracing::warn!(source = %source, reason = %reason, message, "Transport auth failed");
                    }
                    WsEvent::Closed => {
                        tracing::info!("Transport closed normally");
                        break;
                    }
                    WsEvent::Terminated { message } => {
                        tracing::error!(message, "Transport terminated");
                        break;
                    }
                }
            }
            tracing::debug!("Applicator task stopped");
        });
        self.apply_task = Some(handle);
    }

    /// Authenticates the connection.
    ///
    /// # Errors
    ///
    /// Returns the classified authentication failure.
    pub async fn login(&self) -> Result<chrono::DateTime<chrono::Utc>, BitmexError> {
        self.ws.login().await.map_err(BitmexError::from)
    }

    /// Requests a graceful shutdown of the transport.
    ///
    /// In-flight REST work is not canceled; await it before dropping the
    /// client if completion matters.
    pub fn disconnect(&self) {
        self.ws.disconnect();
    }

    /// Subscribes to topics; frames buffer until the socket (and, for
    /// private channels, authentication) is ready.
    ///
    /// # Errors
    ///
    /// Returns an error when the send buffer is full.
    pub fn subscribe(&self, topics: Vec<Ustr>) -> Result<(), BitmexError> {
        self.ws.subscribe(topics).map_err(BitmexError::from)
    }

    /// Unsubscribes from topics.
    ///
    /// # Errors
    ///
    /// Returns an error when the send buffer is full.
    pub fn unsubscribe(&self, topics: Vec<Ustr>) -> Result<(), BitmexError> {
        self.ws.unsubscribe(topics).map_err(BitmexError::from)
    }

    /// Seeds the instrument registry from `GET /instrument/active`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn bootstrap_instruments(&self) -> Result<usize, BitmexError> {
        let rows = self
            .http
            .get_instruments(true)
            .await
            .map_err(BitmexError::from)?;
        let count = rows.len();

        let mut state = self.state.lock().expect("state lock poisoned");
        for row in &rows {
            let msg = instrument_row_from_http(row);
            let prev = state.instruments.get(&msg.symbol).cloned();
            let instrument = state.ensure_instrument(msg.symbol);
            let mutated = instrument.apply(&msg);
            let snapshot = instrument.clone();
            if prev.is_none() || mutated {
                let changed = prev
                    .as_ref()
                    .map(|p| Instrument::changed_fields(p, &snapshot))
                    .unwrap_or_default();
                state
                    .events
                    .instruments
                    .publish(prev, snapshot, changed, UpdateReason::Snapshot);
            }
        }
        tracing::info!(count, "Instruments bootstrapped");
        Ok(count)
    }

    /// Places a buy order.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the classified placement failure.
    pub async fn buy(
        &self,
        symbol: &str,
        size: f64,
        price: Option<f64>,
        order_type: crate::common::enums::BitmexOrderType,
        opts: PlaceOptions,
    ) -> Result<Order, BitmexError> {
        self.place(BitmexSide::Buy, symbol, size, price, order_type, opts)
            .await
    }

    /// Places a sell order.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the classified placement failure.
    pub async fn sell(
        &self,
        symbol: &str,
        size: f64,
        price: Option<f64>,
        order_type: crate::common::enums::BitmexOrderType,
        opts: PlaceOptions,
    ) -> Result<Order, BitmexError> {
        self.place(BitmexSide::Sell, symbol, size, price, order_type, opts)
            .await
    }

    async fn place(
        &self,
        side: BitmexSide,
        symbol: &str,
        size: f64,
        price: Option<f64>,
        order_type: crate::common::enums::BitmexOrderType,
        opts: PlaceOptions,
    ) -> Result<Order, BitmexError> {
        let (best_bid, best_ask) = {
            let state = self.state.lock().expect("state lock poisoned");
            match state.book(&Ustr::from(symbol.trim())) {
                Some(book) => (
                    book.best_bid().map(|level| level.price),
                    book.best_ask().map(|level| level.price),
                ),
                None => (None, None),
            }
        };

        let request = PlaceRequest {
            symbol: symbol.to_string(),
            side,
            size,
            price,
            order_type,
            opts,
            best_ask,
            best_bid,
        };
        let input = validate_place_input(&request)?;
        self.submit(input).await
    }

    /// Submits an already-normalized place input.
    ///
    /// # Errors
    ///
    /// Returns the classified placement failure.
    pub async fn submit(&self, input: NormalizedPlaceInput) -> Result<Order, BitmexError> {
        self.submitter.submit(input).await
    }

    /// Cancels an order by server id or client order id.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn cancel_order(
        &self,
        order_id: Option<&str>,
        cl_ord_id: Option<&str>,
    ) -> Result<Vec<Order>, BitmexError> {
        self.submitter
            .cancel(
                order_id.map(Ustr::from),
                cl_ord_id.map(Ustr::from),
                None,
            )
            .await
    }

    /// Amends an order.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn amend_order(&self, params: &PutOrderParams) -> Result<Order, BitmexError> {
        self.submitter.amend(params).await
    }

    /// Registers a subscriber for order diff events.
    pub fn on_order_update(
        &self,
        subscriber: impl Fn(&crate::events::UpdateEvent<Order>) + Send + Sync + 'static,
    ) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.events.orders.subscribe(subscriber);
    }

    /// Registers a subscriber for position diff events.
    pub fn on_position_update(
        &self,
        subscriber: impl Fn(&crate::events::UpdateEvent<Position>) + Send + Sync + 'static,
    ) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.events.positions.subscribe(subscriber);
    }

    /// Registers a subscriber for wallet diff events.
    pub fn on_wallet_update(
        &self,
        subscriber: impl Fn(&crate::events::UpdateEvent<Wallet>) + Send + Sync + 'static,
    ) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.events.wallets.subscribe(subscriber);
    }

    /// Registers a subscriber for instrument diff events.
    pub fn on_instrument_update(
        &self,
        subscriber: impl Fn(&crate::events::UpdateEvent<Instrument>) + Send + Sync + 'static,
    ) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.events.instruments.subscribe(subscriber);
    }

    /// Snapshot of all known orders.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .orders
            .snapshot()
    }

    /// Snapshot of orders with an active status.
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .orders
            .active()
    }

    /// Looks up an order by client order id.
    #[must_use]
    pub fn order_by_cl_ord_id(&self, cl_ord_id: &str) -> Option<Order> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .orders
            .get_by_cl_ord_id(cl_ord_id)
            .cloned()
    }

    /// Snapshot of all known positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .positions
            .snapshot()
    }

    /// Snapshot of non-zero positions.
    #[must_use]
    pub fn active_positions(&self) -> Vec<Position> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .positions
            .active()
    }

    /// Snapshot of all known wallets.
    #[must_use]
    pub fn wallets(&self) -> Vec<Wallet> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .wallets
            .snapshot()
    }

    /// Snapshot of one instrument by native symbol.
    #[must_use]
    pub fn instrument(&self, symbol: &str) -> Option<Instrument> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .instrument(&Ustr::from(symbol))
            .cloned()
    }

    /// Best bid of a symbol's local book.
    #[must_use]
    pub fn best_bid(&self, symbol: &str) -> Option<BookLevelView> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .book(&Ustr::from(symbol))
            .and_then(|book| book.best_bid())
    }

    /// Best ask of a symbol's local book.
    #[must_use]
    pub fn best_ask(&self, symbol: &str) -> Option<BookLevelView> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .book(&Ustr::from(symbol))
            .and_then(|book| book.best_ask())
    }

    /// Entity counts for logging and health reporting.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        self.state.lock().expect("state lock poisoned").summary()
    }
}

impl Drop for BitmexClient {
    fn drop(&mut self) {
        if let Some(handle) = self.apply_task.take() {
            handle.abort();
        }
    }
}

fn instrument_row_from_http(row: &BitmexHttpInstrument) -> BitmexInstrumentMsg {
    BitmexInstrumentMsg {
        symbol: row.symbol,
        state: row.state,
        typ: row.typ,
        underlying: row.underlying,
        quote_currency: row.quote_currency,
        lot_size: row.lot_size,
        tick_size: row.tick_size,
        multiplier: row.multiplier,
        mark_price: row.mark_price,
        indicative_settle_price: row.indicative_settle_price,
        last_price: row.last_price,
        last_change_pcnt: row.last_change_pcnt,
        funding_rate: row.funding_rate,
        funding_timestamp: row.funding_timestamp,
        funding_interval: row.funding_interval,
        expiry: row.expiry,
        volume24h: row.volume24h,
        turnover24h: row.turnover24h,
        open_interest: row.open_interest,
        limit_up_price: row.limit_up_price,
        limit_down_price: row.limit_down_price,
        max_price: row.max_price,
        timestamp: row.timestamp,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
