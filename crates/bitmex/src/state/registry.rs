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

//! In-memory registries with secondary indexes.
//!
//! Registries are single-writer (the applicator or a REST completion); all
//! mutation helpers return change records so the caller can emit diff events.
//! Readers obtain snapshot copies.

use ahash::{AHashMap, AHashSet};
use futures_util::future::{BoxFuture, Shared};
use std::sync::Arc;
use ustr::Ustr;

use super::{
    order::{Order, OrderPatch},
    position::Position,
    wallet::Wallet,
};
use crate::{
    error::BitmexError,
    websocket::messages::{BitmexMarginMsg, BitmexPositionMsg, BitmexWalletMsg},
};

/// The coalescible result of an in-flight placement, shared by duplicate
/// submissions for the same client order id.
pub type SharedOrderResult = Shared<BoxFuture<'static, Result<Order, Arc<BitmexError>>>>;

/// A mutation record for event emission.
#[derive(Clone, Debug)]
pub struct Change<T> {
    pub prev: Option<T>,
    pub snapshot: T,
    pub changed: Vec<&'static str>,
}

/// Normalizes a client order id for indexing.
#[must_use]
pub fn normalize_cl_ord_id(cl_ord_id: &str) -> Option<Ustr> {
    let trimmed = cl_ord_id.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(Ustr::from(trimmed))
    }
}

/// Orders indexed by order id, client order id, symbol and active status.
#[derive(Debug, Default)]
pub struct OrdersRegistry {
    orders: AHashMap<Ustr, Order>,
    by_cl_ord_id: AHashMap<Ustr, Ustr>,
    by_symbol: AHashMap<Ustr, AHashSet<Ustr>>,
    active: AHashSet<Ustr>,
    inflight: AHashMap<Ustr, SharedOrderResult>,
}

impl OrdersRegistry {
    /// Creates a new empty [`OrdersRegistry`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Returns `true` when no orders are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Looks up an order by server-assigned id.
    #[must_use]
    pub fn get(&self, order_id: &Ustr) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Looks up an order by client order id.
    #[must_use]
    pub fn get_by_cl_ord_id(&self, cl_ord_id: &str) -> Option<&Order> {
        let key = normalize_cl_ord_id(cl_ord_id)?;
        self.by_cl_ord_id
            .get(&key)
            .and_then(|order_id| self.orders.get(order_id))
    }

    /// Orders for a symbol, in arbitrary order.
    #[must_use]
    pub fn for_symbol(&self, symbol: &Ustr) -> Vec<Order> {
        self.by_symbol
            .get(symbol)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.orders.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Orders whose status counts as active.
    #[must_use]
    pub fn active(&self) -> Vec<Order> {
        self.active
            .iter()
            .filter_map(|id| self.orders.get(id))
            .cloned()
            .collect()
    }

    /// Snapshot of all orders.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    /// Applies a patch, creating the order on first observation.
    ///
    /// Returns `None` when the patch changed nothing observable (idempotent
    /// replays); secondary indexes are refreshed either way.
    pub fn apply_patch(&mut self, patch: &OrderPatch) -> Option<Change<Order>> {
        if patch.order_id.is_empty() {
            return None;
        }

        let existing = self.orders.contains_key(&patch.order_id);
        let prev = self.orders.get(&patch.order_id).cloned();
        let order = self
            .orders
            .entry(patch.order_id)
            .or_insert_with(|| Order::new(patch.order_id));

        let mutated = order.apply(patch);
        let snapshot = order.clone();
        self.reindex(&snapshot);

        if existing && !mutated {
            return None;
        }
        let changed = match &prev {
            Some(prev) => Order::changed_fields(prev, &snapshot),
            None => Vec::new(),
        };
        Some(Change {
            prev,
            snapshot,
            changed,
        })
    }

    /// Removes an order and its index entries.
    pub fn remove(&mut self, order_id: &Ustr) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        if let Some(cl_ord_id) = order.cl_ord_id.as_ref().and_then(|c| normalize_cl_ord_id(c)) {
            self.by_cl_ord_id.remove(&cl_ord_id);
        }
        if let Some(symbol) = &order.symbol
            && let Some(ids) = self.by_symbol.get_mut(symbol)
        {
            ids.remove(order_id);
            if ids.is_empty() {
                self.by_symbol.remove(symbol);
            }
        }
        self.active.remove(order_id);
        Some(order)
    }

    fn reindex(&mut self, order: &Order) {
        if let Some(cl_ord_id) = order.cl_ord_id.as_ref().and_then(|c| normalize_cl_ord_id(c)) {
            self.by_cl_ord_id.insert(cl_ord_id, order.order_id);
        }
        if let Some(symbol) = order.symbol {
            self.by_symbol
                .entry(symbol)
                .or_default()
                .insert(order.order_id);
        }
        if order.status.is_active() {
            self.active.insert(order.order_id);
        } else {
            self.active.remove(&order.order_id);
        }
    }

    /// Gets the in-flight placement future for a client order id.
    #[must_use]
    pub fn get_inflight(&self, cl_ord_id: &str) -> Option<SharedOrderResult> {
        let key = normalize_cl_ord_id(cl_ord_id)?;
        self.inflight.get(&key).cloned()
    }

    /// Registers an in-flight placement future.
    pub fn insert_inflight(&mut self, cl_ord_id: &str, future: SharedOrderResult) {
        if let Some(key) = normalize_cl_ord_id(cl_ord_id) {
            self.inflight.insert(key, future);
        }
    }

    /// Clears the in-flight record once the placement settled.
    pub fn remove_inflight(&mut self, cl_ord_id: &str) {
        if let Some(key) = normalize_cl_ord_id(cl_ord_id) {
            self.inflight.remove(&key);
        }
    }
}

/// Positions indexed by composite key, account, symbol and active set.
#[derive(Debug, Default)]
pub struct PositionsRegistry {
    positions: AHashMap<String, Position>,
    by_account: AHashMap<i64, AHashSet<String>>,
    by_symbol: AHashMap<Ustr, AHashSet<String>>,
    active: AHashSet<String>,
}

impl PositionsRegistry {
    /// Creates a new empty [`PositionsRegistry`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` when no positions are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Looks up a position by account and symbol.
    #[must_use]
    pub fn get(&self, account: i64, symbol: &Ustr) -> Option<&Position> {
        self.positions.get(&Position::key(account, symbol))
    }

    /// Positions of one account.
    #[must_use]
    pub fn for_account(&self, account: i64) -> Vec<Position> {
        self.by_account
            .get(&account)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.positions.get(key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Positions for one symbol across accounts.
    #[must_use]
    pub fn for_symbol(&self, symbol: &Ustr) -> Vec<Position> {
        self.by_symbol
            .get(symbol)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.positions.get(key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Non-zero positions.
    #[must_use]
    pub fn active(&self) -> Vec<Position> {
        self.active
            .iter()
            .filter_map(|key| self.positions.get(key))
            .cloned()
            .collect()
    }

    /// Snapshot of all positions.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Composite keys currently known for an account.
    #[must_use]
    pub fn keys_for_account(&self, account: i64) -> Vec<String> {
        self.by_account
            .get(&account)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Applies a row, creating the position on first observation.
    ///
    /// Returns `None` when the row was stale or changed nothing.
    pub fn apply_row(
        &mut self,
        row: &BitmexPositionMsg,
        allow_older: bool,
    ) -> Option<Change<Position>> {
        let key = Position::key(row.account, &row.symbol);
        let existing = self.positions.contains_key(&key);
        let prev = self.positions.get(&key).cloned();

        let position = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::new(row.account, row.symbol));
        let mutated = position.apply(row, allow_older);
        let snapshot = position.clone();

        self.by_account
            .entry(row.account)
            .or_default()
            .insert(key.clone());
        self.by_symbol.entry(row.symbol).or_default().insert(key.clone());
        self.refresh_active(&key);

        if existing && !mutated {
            return None;
        }
        let changed = match &prev {
            Some(prev) => Position::changed_fields(prev, &snapshot),
            None => Vec::new(),
        };
        Some(Change {
            prev,
            snapshot,
            changed,
        })
    }

    /// Forces a position flat and removes it, returning the change for
    /// emission before removal (observable resync pruning).
    pub fn flatten_and_remove(&mut self, key: &str) -> Option<Change<Position>> {
        let position = self.positions.get_mut(key)?;
        let prev = position.clone();
        position.force_flat();
        let snapshot = position.clone();
        let changed = Position::changed_fields(&prev, &snapshot);

        self.remove(key);
        Some(Change {
            prev: Some(prev),
            snapshot,
            changed,
        })
    }

    /// Removes a position and its index entries.
    pub fn remove(&mut self, key: &str) -> Option<Position> {
        let position = self.positions.remove(key)?;
        if let Some(keys) = self.by_account.get_mut(&position.account) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_account.remove(&position.account);
            }
        }
        if let Some(keys) = self.by_symbol.get_mut(&position.symbol) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_symbol.remove(&position.symbol);
            }
        }
        self.active.remove(key);
        Some(position)
    }

    /// Keeps the active set in sync after any mutation.
    fn refresh_active(&mut self, key: &str) {
        let is_active = self
            .positions
            .get(key)
            .is_some_and(Position::is_active);
        if is_active {
            self.active.insert(key.to_string());
        } else {
            self.active.remove(key);
        }
    }
}

/// Wallets keyed by normalized account id.
#[derive(Debug, Default)]
pub struct Wallets {
    wallets: AHashMap<String, Wallet>,
}

impl Wallets {
    /// Creates a new empty [`Wallets`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known wallets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// Returns `true` when no wallets are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    fn account_key(account: i64) -> String {
        account.to_string().to_ascii_lowercase()
    }

    /// Looks up a wallet by account.
    #[must_use]
    pub fn get(&self, account: i64) -> Option<&Wallet> {
        self.wallets.get(&Self::account_key(account))
    }

    /// Snapshot of all wallets.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Wallet> {
        self.wallets.values().cloned().collect()
    }

    /// Applies a balance row, creating the wallet on first observation.
    ///
    /// Returns `None` when the row was stale or changed nothing.
    pub fn apply_balance_row(
        &mut self,
        row: &BitmexWalletMsg,
        reset: bool,
    ) -> Option<Change<Wallet>> {
        let key = Self::account_key(row.account);
        let existing = self.wallets.contains_key(&key);
        let prev = self.wallets.get(&key).cloned();

        let wallet = self
            .wallets
            .entry(key)
            .or_insert_with(|| Wallet::new(row.account));
        let mutated = wallet.apply_balance(row, reset);
        let snapshot = wallet.clone();

        if existing && !mutated {
            return None;
        }
        let changed = match &prev {
            Some(prev) => Wallet::changed_fields(prev, &snapshot),
            None => Vec::new(),
        };
        Some(Change {
            prev,
            snapshot,
            changed,
        })
    }

    /// Applies a margin row, creating the wallet on first observation.
    ///
    /// Returns `None` when the row was stale or changed nothing.
    pub fn apply_margin_row(
        &mut self,
        row: &BitmexMarginMsg,
        reset: bool,
    ) -> Option<Change<Wallet>> {
        let key = Self::account_key(row.account);
        let existing = self.wallets.contains_key(&key);
        let prev = self.wallets.get(&key).cloned();

        let wallet = self
            .wallets
            .entry(key)
            .or_insert_with(|| Wallet::new(row.account));
        let mutated = wallet.apply_margin(row, reset);
        let snapshot = wallet.clone();

        if existing && !mutated {
            return None;
        }
        let changed = match &prev {
            Some(prev) => Wallet::changed_fields(prev, &snapshot),
            None => Vec::new(),
        };
        Some(Change {
            prev,
            snapshot,
            changed,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
