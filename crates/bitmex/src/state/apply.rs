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

//! Channel applicator: translates table deltas into entity mutations.
//!
//! The applicator never propagates errors to the transport; malformed or
//! stale rows are dropped with debug logging. Its only output besides state
//! mutation is the list of topics that need a resubscribe (out-of-sync
//! books).

use std::hash::Hash;

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ustr::Ustr;

use super::{BitmexState, Liquidation, Settlement};
use crate::{
    common::metrics,
    events::UpdateReason,
    state::{instrument::Instrument, order::OrderPatch, position::Position},
    websocket::{
        enums::BitmexAction,
        messages::{
            BitmexExecutionMsg, BitmexInstrumentMsg, BitmexLiquidationMsg, BitmexMarginMsg,
            BitmexOrderBookMsg, BitmexOrderMsg, BitmexPositionMsg, BitmexSettlementMsg,
            BitmexTableMessage, BitmexTradeMsg, BitmexTransactMsg, BitmexWalletMsg,
        },
    },
};

/// Keeps the newest row per key within one batch, preserving first-seen order.
fn coalesce_newest<'a, T, K, FK, FT>(rows: &'a [T], key_fn: FK, ts_fn: FT) -> Vec<&'a T>
where
    K: Eq + Hash,
    FK: Fn(&T) -> K,
    FT: Fn(&T) -> Option<DateTime<Utc>>,
{
    let mut newest: IndexMap<K, &T> = IndexMap::new();
    for row in rows {
        match newest.entry(key_fn(row)) {
            indexmap::map::Entry::Occupied(mut entry) => {
                if ts_fn(row) >= ts_fn(entry.get()) {
                    entry.insert(row);
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(row);
            }
        }
    }
    newest.into_values().collect()
}

const fn reason_for(action: BitmexAction) -> UpdateReason {
    match action {
        BitmexAction::Partial => UpdateReason::Snapshot,
        BitmexAction::Insert => UpdateReason::Insert,
        BitmexAction::Update => UpdateReason::Update,
        BitmexAction::Delete => UpdateReason::Delete,
    }
}

impl BitmexState {
    /// Applies one table frame, in arrival order.
    ///
    /// Returns the topics the transport should resubscribe (out-of-sync
    /// books).
    pub fn apply(&mut self, msg: &BitmexTableMessage) -> Vec<Ustr> {
        let mut resubscribe = Vec::new();
        match msg {
            BitmexTableMessage::Instrument { action, data } => {
                self.apply_instrument(*action, data);
            }
            BitmexTableMessage::Trade { action, data } => {
                self.apply_trade(*action, data);
            }
            BitmexTableMessage::OrderBookL2 { action, data } => {
                self.apply_book(*action, data, &mut resubscribe);
            }
            BitmexTableMessage::Order { action, data } => {
                self.apply_order(*action, data);
            }
            BitmexTableMessage::Execution { action, data } => {
                self.apply_execution(*action, data);
            }
            BitmexTableMessage::Position { action, data } => {
                self.apply_position(*action, data);
            }
            BitmexTableMessage::Wallet { action, data } => {
                self.apply_wallet(*action, data);
            }
            BitmexTableMessage::Margin { action, data } => {
                self.apply_margin(*action, data);
            }
            BitmexTableMessage::Liquidation { action, data } => {
                self.apply_liquidation(*action, data);
            }
            BitmexTableMessage::Settlement { action, data } => {
                self.apply_settlement(*action, data);
            }
            BitmexTableMessage::Transact { action, data } => {
                self.apply_transact(*action, data);
            }
        }
        resubscribe
    }

    fn apply_instrument(&mut self, action: BitmexAction, data: &[BitmexInstrumentMsg]) {
        for row in data {
            let prev = self.instruments.get(&row.symbol).cloned();
            let delisted = prev.as_ref().is_some_and(Instrument::is_delisted);

            match action {
                BitmexAction::Partial | BitmexAction::Insert => {
                    if delisted {
                        // Revival replaces the stale entity with fresh fields
                        let unified = self.symbol_map().unify(row.symbol.as_str());
                        self.instruments
                            .insert(row.symbol, Instrument::new(row.symbol, unified));
                    }
                    let instrument = self.ensure_instrument(row.symbol);
                    let mutated = instrument.apply(row);
                    let snapshot = instrument.clone();
                    if prev.is_none() || mutated {
                        let changed = prev
                            .as_ref()
                            .map(|p| Instrument::changed_fields(p, &snapshot))
                            .unwrap_or_default();
                        self.events
                            .instruments
                            .publish(prev, snapshot, changed, reason_for(action));
                    }
                }
                BitmexAction::Update => {
                    if delisted {
                        tracing::debug!(symbol = %row.symbol, "Update for delisted instrument dropped");
                        continue;
                    }
                    let instrument = self.ensure_instrument(row.symbol);
                    let mutated = instrument.apply(row);
                    let snapshot = instrument.clone();
                    if prev.is_none() || mutated {
                        let changed = prev
                            .as_ref()
                            .map(|p| Instrument::changed_fields(p, &snapshot))
                            .unwrap_or_default();
                        self.events
                            .instruments
                            .publish(prev, snapshot, changed, UpdateReason::Update);
                    }
                }
                BitmexAction::Delete => {
                    let Some(instrument) = self.instruments.get_mut(&row.symbol) else {
                        continue;
                    };
                    instrument.state =
                        crate::common::enums::BitmexInstrumentState::Delisted;
                    let snapshot = instrument.clone();
                    let changed = prev
                        .as_ref()
                        .map(|p| Instrument::changed_fields(p, &snapshot))
                        .unwrap_or_default();
                    self.events
                        .instruments
                        .publish(prev, snapshot, changed, UpdateReason::Delete);
                }
            }
        }
    }

    fn apply_trade(&mut self, action: BitmexAction, data: &[BitmexTradeMsg]) {
        if action == BitmexAction::Delete {
            return;
        }
        for row in data {
            let prev = self.instruments.get(&row.symbol).cloned();
            let instrument = self.ensure_instrument(row.symbol);
            instrument.push_trade(row);
            let snapshot = instrument.clone();

            let mut changed = prev
                .as_ref()
                .map(|p| Instrument::changed_fields(p, &snapshot))
                .unwrap_or_default();
            changed.push("trades");
            self.events
                .instruments
                .publish(prev, snapshot, changed, UpdateReason::Update);
        }
    }

    fn apply_book(
        &mut self,
        action: BitmexAction,
        data: &[BitmexOrderBookMsg],
        resubscribe: &mut Vec<Ustr>,
    ) {
        let mut by_symbol: IndexMap<Ustr, Vec<BitmexOrderBookMsg>> = IndexMap::new();
        for row in data {
            by_symbol.entry(row.symbol).or_default().push(row.clone());
        }

        for (symbol, rows) in by_symbol {
            let book = self.ensure_book(symbol);
            let delta = match action {
                BitmexAction::Partial => book.reset(&rows),
                BitmexAction::Insert => book.insert(&rows),
                BitmexAction::Update => book.update(&rows),
                BitmexAction::Delete => book.delete(&rows),
            };
            tracing::trace!(
                %symbol,
                inserted = delta.inserted,
                updated = delta.updated,
                deleted = delta.deleted,
                "Book delta",
            );

            if book.out_of_sync && !book.resync_requested {
                book.resync_requested = true;
                let topic = Ustr::from(&format!("orderBookL2:{symbol}"));
                tracing::warn!(%symbol, "Book out of sync; requesting resubscribe");
                resubscribe.push(topic);
            }
        }
    }

    fn apply_order(&mut self, action: BitmexAction, data: &[BitmexOrderMsg]) {
        match action {
            BitmexAction::Partial => {
                // An empty partial still confirms the snapshot
                self.set_awaiting_order_snapshot(false);
                if data.is_empty() {
                    tracing::debug!("Empty order snapshot confirmed");
                }
                for row in data {
                    let existing = self.orders.get(&row.order_id).is_some();
                    let reason = if existing {
                        UpdateReason::Resync
                    } else {
                        UpdateReason::Snapshot
                    };
                    self.merge_order_row(&OrderPatch::from(row), reason, row.timestamp);
                }
            }
            BitmexAction::Insert | BitmexAction::Update => {
                if self.awaiting_order_snapshot() {
                    tracing::debug!(
                        rows = data.len(),
                        "Order increment dropped while awaiting snapshot",
                    );
                    return;
                }
                for row in data {
                    self.merge_order_row(
                        &OrderPatch::from(row),
                        reason_for(action),
                        row.timestamp,
                    );
                }
            }
            BitmexAction::Delete => {
                for row in data {
                    let Some(order) = self.orders.get(&row.order_id).cloned() else {
                        continue;
                    };
                    self.events.orders.publish(
                        Some(order.clone()),
                        order,
                        Vec::new(),
                        UpdateReason::Delete,
                    );
                    self.orders.remove(&row.order_id);
                }
            }
        }
    }

    fn apply_execution(&mut self, action: BitmexAction, data: &[BitmexExecutionMsg]) {
        for row in data {
            if row.order_id.is_none() {
                tracing::debug!("Execution row without order id dropped");
                continue;
            }
            let reason = if action == BitmexAction::Partial {
                UpdateReason::Snapshot
            } else {
                UpdateReason::Update
            };
            self.merge_order_row(
                &OrderPatch::from(row),
                reason,
                row.timestamp.or(row.transact_time),
            );
        }
    }

    fn merge_order_row(
        &mut self,
        patch: &OrderPatch,
        reason: UpdateReason,
        ts: Option<DateTime<Utc>>,
    ) {
        if let Some(change) = self.orders.apply_patch(patch) {
            self.metrics()
                .increment_counter(metrics::ORDER_UPDATE_COUNT, 1, &[]);
            self.observe_private_latency(ts);
            self.events
                .orders
                .publish(change.prev, change.snapshot, change.changed, reason);
        }
    }

    fn apply_position(&mut self, action: BitmexAction, data: &[BitmexPositionMsg]) {
        let rows = coalesce_newest(
            data,
            |row| Position::key(row.account, &row.symbol),
            |row| row.timestamp,
        );

        match action {
            BitmexAction::Partial => {
                // A snapshot prunes keys it no longer carries, observably
                let accounts: AHashSet<i64> = rows.iter().map(|row| row.account).collect();
                let present: AHashSet<String> = rows
                    .iter()
                    .map(|row| Position::key(row.account, &row.symbol))
                    .collect();
                for account in accounts {
                    for key in self.positions.keys_for_account(account) {
                        if !present.contains(&key)
                            && let Some(change) = self.positions.flatten_and_remove(&key)
                        {
                            tracing::debug!(key, "Position pruned by snapshot");
                            self.events.positions.publish(
                                change.prev,
                                change.snapshot,
                                change.changed,
                                UpdateReason::Resync,
                            );
                        }
                    }
                }
                for row in rows {
                    self.merge_position_row(row, true, UpdateReason::Snapshot);
                }
            }
            BitmexAction::Insert | BitmexAction::Update => {
                for row in rows {
                    self.merge_position_row(row, false, reason_for(action));
                }
            }
            BitmexAction::Delete => {
                for row in rows {
                    let key = Position::key(row.account, &row.symbol);
                    if let Some(change) = self.positions.flatten_and_remove(&key) {
                        self.metrics()
                            .increment_counter(metrics::POSITION_UPDATE_COUNT, 1, &[]);
                        self.events.positions.publish(
                            change.prev,
                            change.snapshot,
                            change.changed,
                            UpdateReason::Delete,
                        );
                    }
                }
            }
        }
    }

    fn merge_position_row(
        &mut self,
        row: &BitmexPositionMsg,
        allow_older: bool,
        reason: UpdateReason,
    ) {
        if let Some(change) = self.positions.apply_row(row, allow_older) {
            self.metrics()
                .increment_counter(metrics::POSITION_UPDATE_COUNT, 1, &[]);
            self.observe_private_latency(row.timestamp);
            self.events
                .positions
                .publish(change.prev, change.snapshot, change.changed, reason);
        }
    }

    fn apply_wallet(&mut self, action: BitmexAction, data: &[BitmexWalletMsg]) {
        if action == BitmexAction::Delete {
            tracing::debug!(rows = data.len(), "Wallet delete ignored");
            return;
        }
        let rows = coalesce_newest(
            data,
            |row| (row.account, row.currency.as_str().to_ascii_lowercase()),
            |row| row.timestamp,
        );
        let reset = action == BitmexAction::Partial;

        for row in rows {
            if reset && let Some(ts) = row.timestamp {
                let age = (Utc::now() - ts).num_seconds();
                if age >= 0 {
                    self.metrics().observe_histogram(
                        metrics::WALLET_SNAPSHOT_AGE_SEC,
                        age as f64,
                        &[],
                    );
                }
            }
            if let Some(change) = self.wallets.apply_balance_row(row, reset) {
                self.metrics()
                    .increment_counter(metrics::WALLET_UPDATE_COUNT, 1, &[]);
                self.observe_private_latency(row.timestamp);
                self.events.wallets.publish(
                    change.prev,
                    change.snapshot,
                    change.changed,
                    reason_for(action),
                );
            }
        }
    }

    fn apply_margin(&mut self, action: BitmexAction, data: &[BitmexMarginMsg]) {
        if action == BitmexAction::Delete {
            return;
        }
        let rows = coalesce_newest(
            data,
            |row| (row.account, row.currency.as_str().to_ascii_lowercase()),
            |row| row.timestamp,
        );
        let reset = action == BitmexAction::Partial;

        for row in rows {
            if let Some(change) = self.wallets.apply_margin_row(row, reset) {
                self.metrics()
                    .increment_counter(metrics::WALLET_UPDATE_COUNT, 1, &[]);
                self.events.wallets.publish(
                    change.prev,
                    change.snapshot,
                    change.changed,
                    reason_for(action),
                );
            }
        }
    }

    fn apply_liquidation(&mut self, action: BitmexAction, data: &[BitmexLiquidationMsg]) {
        for row in data {
            match action {
                BitmexAction::Partial | BitmexAction::Insert | BitmexAction::Update => {
                    let entry = self
                        .liquidations
                        .entry(row.order_id)
                        .or_insert_with(|| Liquidation {
                            order_id: row.order_id,
                            symbol: None,
                            side: None,
                            price: None,
                            leaves_qty: None,
                        });
                    if let Some(v) = row.symbol {
                        entry.symbol = Some(v);
                    }
                    if let Some(v) = row.side {
                        entry.side = Some(v);
                    }
                    if let Some(v) = row.price {
                        entry.price = Some(v);
                    }
                    if let Some(v) = row.leaves_qty {
                        entry.leaves_qty = Some(v);
                    }
                }
                BitmexAction::Delete => {
                    self.liquidations.remove(&row.order_id);
                }
            }
        }
    }

    fn apply_settlement(&mut self, action: BitmexAction, data: &[BitmexSettlementMsg]) {
        if matches!(action, BitmexAction::Partial | BitmexAction::Insert) {
            for row in data {
                self.push_settlement(Settlement {
                    ts: row.timestamp,
                    symbol: row.symbol,
                    settlement_type: row.settlement_type,
                    settled_price: row.settled_price,
                });
            }
        }
    }

    fn apply_transact(&mut self, action: BitmexAction, data: &[BitmexTransactMsg]) {
        // Reserved extension point: deserialized but not applied
        tracing::debug!(action = %action, rows = data.len(), "Transact rows ignored");
    }

    fn observe_private_latency(&self, ts: Option<DateTime<Utc>>) {
        if let Some(ts) = ts {
            let ms = (Utc::now() - ts).num_milliseconds();
            if ms >= 0 {
                self.metrics()
                    .observe_histogram(metrics::PRIVATE_LATENCY_MS, ms as f64, &[]);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
