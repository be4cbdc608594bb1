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

//! Locally maintained exchange state: entities, registries and the channel
//! applicator.

pub mod apply;
pub mod book;
pub mod instrument;
pub mod order;
pub mod position;
pub mod registry;
pub mod status;
pub mod wallet;

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use ustr::Ustr;

use crate::{
    common::{
        enums::BitmexSide,
        metrics::{MetricsSink, NoopMetrics},
        symbol::{BitmexSymbolMap, SymbolMapper},
    },
    events::{Publisher, UpdateReason},
    state::{
        book::OrderBookL2,
        instrument::Instrument,
        order::{Order, OrderPatch},
        position::Position,
        registry::{OrdersRegistry, PositionsRegistry, Wallets},
        wallet::Wallet,
    },
};

/// Maximum settlement rows retained.
const SETTLEMENTS_LIMIT: usize = 256;

/// A liquidation order observed on the public feed.
#[derive(Clone, Debug, PartialEq)]
pub struct Liquidation {
    pub order_id: Ustr,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub price: Option<f64>,
    pub leaves_qty: Option<f64>,
}

/// A settlement observed on the public feed.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub ts: DateTime<Utc>,
    pub symbol: Ustr,
    pub settlement_type: Option<Ustr>,
    pub settled_price: Option<f64>,
}

/// Per-entity diff publishers.
#[derive(Debug, Default)]
pub struct StateEvents {
    pub instruments: Publisher<Instrument>,
    pub orders: Publisher<Order>,
    pub positions: Publisher<Position>,
    pub wallets: Publisher<Wallet>,
}

/// The locally consistent, query-able view of exchange state.
///
/// Single-writer: the WebSocket applicator task and REST completions funnel
/// through one lock at state granularity; readers obtain snapshot copies.
pub struct BitmexState {
    pub instruments: AHashMap<Ustr, Instrument>,
    pub books: AHashMap<Ustr, OrderBookL2>,
    pub orders: OrdersRegistry,
    pub positions: PositionsRegistry,
    pub wallets: Wallets,
    pub liquidations: AHashMap<Ustr, Liquidation>,
    pub settlements: VecDeque<Settlement>,
    pub events: StateEvents,
    /// Set after a fresh private subscription; order increments are dropped
    /// until a partial arrives.
    awaiting_order_snapshot: bool,
    symbol_map: Arc<dyn SymbolMapper>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for BitmexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BitmexState))
            .field("summary", &self.summary())
            .field("awaiting_order_snapshot", &self.awaiting_order_snapshot)
            .finish()
    }
}

impl BitmexState {
    /// Creates a new [`BitmexState`] instance.
    #[must_use]
    pub fn new(
        symbol_map: Option<Arc<dyn SymbolMapper>>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            instruments: AHashMap::new(),
            books: AHashMap::new(),
            orders: OrdersRegistry::new(),
            positions: PositionsRegistry::new(),
            wallets: Wallets::new(),
            liquidations: AHashMap::new(),
            settlements: VecDeque::new(),
            events: StateEvents::default(),
            awaiting_order_snapshot: true,
            symbol_map: symbol_map.unwrap_or_else(|| Arc::new(BitmexSymbolMap::default())),
            metrics: metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
        }
    }

    /// Marks private tables as awaiting fresh snapshots (fresh subscription
    /// or reconnect).
    pub fn on_reconnect(&mut self) {
        self.awaiting_order_snapshot = true;
    }

    /// Returns `true` while order increments are being discarded.
    #[must_use]
    pub fn awaiting_order_snapshot(&self) -> bool {
        self.awaiting_order_snapshot
    }

    pub(crate) fn set_awaiting_order_snapshot(&mut self, awaiting: bool) {
        self.awaiting_order_snapshot = awaiting;
    }

    pub(crate) fn symbol_map(&self) -> &Arc<dyn SymbolMapper> {
        &self.symbol_map
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Looks up an instrument by native symbol.
    #[must_use]
    pub fn instrument(&self, symbol: &Ustr) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    /// Looks up the book for a symbol.
    #[must_use]
    pub fn book(&self, symbol: &Ustr) -> Option<&OrderBookL2> {
        self.books.get(symbol)
    }

    /// Gets or lazily creates the instrument for a symbol.
    pub(crate) fn ensure_instrument(&mut self, symbol: Ustr) -> &mut Instrument {
        let unified = self.symbol_map.unify(symbol.as_str());
        self.instruments
            .entry(symbol)
            .or_insert_with(|| Instrument::new(symbol, unified))
    }

    /// Gets or lazily creates the book for a symbol.
    pub(crate) fn ensure_book(&mut self, symbol: Ustr) -> &mut OrderBookL2 {
        self.books
            .entry(symbol)
            .or_insert_with(|| OrderBookL2::new(symbol))
    }

    /// Records the settlement, keeping the buffer bounded.
    pub(crate) fn push_settlement(&mut self, settlement: Settlement) {
        if self.settlements.len() == SETTLEMENTS_LIMIT {
            self.settlements.pop_front();
        }
        self.settlements.push_back(settlement);
    }

    /// Merges an order patch from a REST acknowledgement or reconcile query.
    ///
    /// Emits a diff event when the merge changed the order; returns the
    /// current snapshot either way.
    pub fn merge_order_patch(
        &mut self,
        patch: &OrderPatch,
        reason: UpdateReason,
    ) -> Option<Order> {
        match self.orders.apply_patch(patch) {
            Some(change) => {
                self.events.orders.publish(
                    change.prev,
                    change.snapshot.clone(),
                    change.changed,
                    reason,
                );
                Some(change.snapshot)
            }
            None => self.orders.get(&patch.order_id).cloned(),
        }
    }

    /// Snapshot of the current positions, orders and wallets for reporting.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            instruments: self.instruments.len(),
            books: self.books.len(),
            orders: self.orders.len(),
            active_orders: self.orders.active().len(),
            positions: self.positions.len(),
            wallets: self.wallets.len(),
        }
    }
}

impl Default for BitmexState {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Entity counts for logging and health reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub instruments: usize,
    pub books: usize,
    pub orders: usize,
    pub active_orders: usize,
    pub positions: usize,
    pub wallets: usize,
}

// Registry snapshot re-exports for downstream use
pub use registry::{Change, SharedOrderResult};
