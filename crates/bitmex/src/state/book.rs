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

//! Level-2 order book keyed by venue order id.
//!
//! Rows map to per-side price-level aggregates with cached best bid/ask.
//! Any unexpected condition (update/delete for an unknown id, duplicate
//! insert, inconsistent side change) marks the book out of sync; the
//! applicator then forces a resubscribe so a fresh snapshot resets it.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ustr::Ustr;

use crate::{common::enums::BitmexSide, websocket::messages::BitmexOrderBookMsg};

/// One book row: the venue-assigned order id's side, price and size.
#[derive(Clone, Debug, PartialEq)]
pub struct BookRow {
    pub side: BitmexSide,
    pub price: Decimal,
    pub size: f64,
}

/// Aggregate of all rows at one price level.
#[derive(Clone, Debug, Default)]
pub struct BookLevel {
    pub total_size: f64,
    pub order_ids: AHashSet<u64>,
}

/// Top-of-book view of one side.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BookLevelView {
    pub price: f64,
    pub size: f64,
}

/// Result of applying a batch of rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookDelta {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub best_bid: Option<BookLevelView>,
    pub best_ask: Option<BookLevelView>,
}

/// A level-2 order book for a single symbol.
#[derive(Clone, Debug, Default)]
pub struct OrderBookL2 {
    pub symbol: Ustr,
    rows: AHashMap<u64, BookRow>,
    bids: BTreeMap<Decimal, BookLevel>,
    asks: BTreeMap<Decimal, BookLevel>,
    best_bid: Option<BookLevelView>,
    best_ask: Option<BookLevelView>,
    pub out_of_sync: bool,
    /// Set once a resubscribe was requested for the current episode.
    pub resync_requested: bool,
}

impl OrderBookL2 {
    /// Creates a new empty [`OrderBookL2`] instance.
    #[must_use]
    pub fn new(symbol: Ustr) -> Self {
        Self {
            symbol,
            ..Default::default()
        }
    }

    /// Number of rows currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when the book holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cached best bid (highest bid price with aggregate size).
    #[must_use]
    pub fn best_bid(&self) -> Option<BookLevelView> {
        self.best_bid
    }

    /// Cached best ask (lowest ask price with aggregate size).
    #[must_use]
    pub fn best_ask(&self) -> Option<BookLevelView> {
        self.best_ask
    }

    /// Looks up a row by venue order id.
    #[must_use]
    pub fn row(&self, id: u64) -> Option<&BookRow> {
        self.rows.get(&id)
    }

    /// Replaces the book with a snapshot; clears the out-of-sync flags.
    pub fn reset(&mut self, rows: &[BitmexOrderBookMsg]) -> BookDelta {
        self.rows.clear();
        self.bids.clear();
        self.asks.clear();
        self.out_of_sync = false;
        self.resync_requested = false;

        let mut delta = BookDelta::default();
        for row in rows {
            if self.insert_row(row) {
                delta.inserted += 1;
            }
        }
        self.finish(delta)
    }

    /// Inserts new rows; a duplicate id marks the book out of sync.
    pub fn insert(&mut self, rows: &[BitmexOrderBookMsg]) -> BookDelta {
        let mut delta = BookDelta::default();
        for row in rows {
            if self.rows.contains_key(&row.id) {
                tracing::debug!(symbol = %self.symbol, id = row.id, "Duplicate book insert");
                self.out_of_sync = true;
                continue;
            }
            if self.insert_row(row) {
                delta.inserted += 1;
            }
        }
        self.finish(delta)
    }

    /// Updates existing rows; an unknown id or side flip marks the book out
    /// of sync.
    pub fn update(&mut self, rows: &[BitmexOrderBookMsg]) -> BookDelta {
        let mut delta = BookDelta::default();
        for msg in rows {
            let Some(row) = self.rows.get(&msg.id).cloned() else {
                tracing::debug!(symbol = %self.symbol, id = msg.id, "Update for unknown row");
                self.out_of_sync = true;
                continue;
            };
            if row.side != msg.side {
                tracing::debug!(symbol = %self.symbol, id = msg.id, "Inconsistent side change");
                self.out_of_sync = true;
                continue;
            }

            let new_price = match msg.price.map(Decimal::try_from) {
                Some(Ok(price)) => price,
                Some(Err(_)) => continue,
                None => row.price,
            };
            let new_size = msg.size.unwrap_or(row.size);

            self.unlink(msg.id, &row);
            self.rows.insert(
                msg.id,
                BookRow {
                    side: row.side,
                    price: new_price,
                    size: new_size,
                },
            );
            self.link(msg.id, row.side, new_price, new_size);
            delta.updated += 1;
        }
        self.finish(delta)
    }

    /// Deletes rows; an unknown id marks the book out of sync.
    pub fn delete(&mut self, rows: &[BitmexOrderBookMsg]) -> BookDelta {
        let mut delta = BookDelta::default();
        for msg in rows {
            let Some(row) = self.rows.remove(&msg.id) else {
                tracing::debug!(symbol = %self.symbol, id = msg.id, "Delete for unknown row");
                self.out_of_sync = true;
                continue;
            };
            self.unlink(msg.id, &row);
            delta.deleted += 1;
        }
        self.finish(delta)
    }

    fn insert_row(&mut self, msg: &BitmexOrderBookMsg) -> bool {
        let Some(Ok(price)) = msg.price.map(Decimal::try_from) else {
            tracing::debug!(symbol = %self.symbol, id = msg.id, "Insert without valid price");
            return false;
        };
        let size = msg.size.unwrap_or(0.0);

        self.rows.insert(
            msg.id,
            BookRow {
                side: msg.side,
                price,
                size,
            },
        );
        self.link(msg.id, msg.side, price, size);
        true
    }

    fn link(&mut self, id: u64, side: BitmexSide, price: Decimal, size: f64) {
        let level = self.side_levels(side).entry(price).or_default();
        level.total_size += size;
        level.order_ids.insert(id);
    }

    fn unlink(&mut self, id: u64, row: &BookRow) {
        let levels = self.side_levels(row.side);
        let mut remove_level = false;
        if let Some(level) = levels.get_mut(&row.price) {
            level.total_size -= row.size;
            level.order_ids.remove(&id);
            remove_level = level.order_ids.is_empty();
        }
        if remove_level {
            levels.remove(&row.price);
        }
    }

    fn side_levels(&mut self, side: BitmexSide) -> &mut BTreeMap<Decimal, BookLevel> {
        match side {
            BitmexSide::Buy => &mut self.bids,
            BitmexSide::Sell => &mut self.asks,
        }
    }

    fn finish(&mut self, mut delta: BookDelta) -> BookDelta {
        self.best_bid = self.bids.last_key_value().map(|(price, level)| BookLevelView {
            price: price.to_f64().unwrap_or_default(),
            size: level.total_size,
        });
        self.best_ask = self
            .asks
            .first_key_value()
            .map(|(price, level)| BookLevelView {
                price: price.to_f64().unwrap_or_default(),
                size: level.total_size,
            });
        delta.best_bid = self.best_bid;
        delta.best_ask = self.best_ask;
        delta
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn row(id: u64, side: &str, price: f64, size: f64) -> BitmexOrderBookMsg {
        serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "id": id,
            "side": side,
            "price": price,
            "size": size,
        }))
        .unwrap()
    }

    fn delete_row(id: u64, side: &str) -> BitmexOrderBookMsg {
        serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "id": id,
            "side": side,
        }))
        .unwrap()
    }

    fn snapshot() -> Vec<BitmexOrderBookMsg> {
        vec![
            row(1, "Buy", 59_999.5, 1_000.0),
            row(2, "Buy", 59_999.0, 500.0),
            row(3, "Buy", 59_999.5, 250.0),
            row(4, "Sell", 60_000.0, 750.0),
            row(5, "Sell", 60_000.5, 300.0),
        ]
    }

    #[rstest]
    fn test_reset_builds_aggregates_and_best() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        let delta = book.reset(&snapshot());

        assert_eq!(delta.inserted, 5);
        assert_eq!(
            delta.best_bid,
            Some(BookLevelView {
                price: 59_999.5,
                size: 1_250.0
            })
        );
        assert_eq!(
            delta.best_ask,
            Some(BookLevelView {
                price: 60_000.0,
                size: 750.0
            })
        );
        assert!(!book.out_of_sync);
    }

    #[rstest]
    fn test_best_bid_not_above_best_ask() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());
        book.update(&[row(1, "Buy", 59_999.5, 100.0)]);
        book.delete(&[delete_row(4, "Sell")]);

        assert!(!book.out_of_sync);
        let (bid, ask) = (book.best_bid().unwrap(), book.best_ask().unwrap());
        assert!(bid.price <= ask.price);
    }

    #[rstest]
    fn test_update_moves_row_across_levels() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        let delta = book.update(&[row(3, "Buy", 59_998.0, 250.0)]);
        assert_eq!(delta.updated, 1);
        // Level 59999.5 now only holds row 1
        assert_eq!(
            delta.best_bid,
            Some(BookLevelView {
                price: 59_999.5,
                size: 1_000.0
            })
        );
    }

    #[rstest]
    fn test_delete_clears_level() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        let delta = book.delete(&[delete_row(4, "Sell")]);
        assert_eq!(delta.deleted, 1);
        assert_eq!(
            delta.best_ask,
            Some(BookLevelView {
                price: 60_000.5,
                size: 300.0
            })
        );
    }

    #[rstest]
    fn test_unknown_update_sets_out_of_sync() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        book.update(&[row(99, "Buy", 59_000.0, 10.0)]);
        assert!(book.out_of_sync);
    }

    #[rstest]
    fn test_unknown_delete_sets_out_of_sync() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        book.delete(&[delete_row(99, "Buy")]);
        assert!(book.out_of_sync);
    }

    #[rstest]
    fn test_duplicate_insert_sets_out_of_sync() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        book.insert(&[row(1, "Buy", 59_999.5, 10.0)]);
        assert!(book.out_of_sync);
        // The original row is untouched
        assert_eq!(book.row(1).unwrap().size, 1_000.0);
    }

    #[rstest]
    fn test_side_flip_sets_out_of_sync() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        book.update(&[row(1, "Sell", 59_999.5, 10.0)]);
        assert!(book.out_of_sync);
    }

    #[rstest]
    fn test_reset_clears_out_of_sync() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());
        book.update(&[row(99, "Buy", 1.0, 1.0)]);
        assert!(book.out_of_sync);
        book.resync_requested = true;

        book.reset(&snapshot());
        assert!(!book.out_of_sync);
        assert!(!book.resync_requested);
    }

    #[rstest]
    fn test_size_only_update_keeps_price() {
        let mut book = OrderBookL2::new(Ustr::from("XBTUSD"));
        book.reset(&snapshot());

        let update: BitmexOrderBookMsg = serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "id": 2,
            "side": "Buy",
            "size": 900,
        }))
        .unwrap();
        book.update(&[update]);

        let row = book.row(2).unwrap();
        assert_eq!(row.size, 900.0);
        assert_eq!(row.price, Decimal::try_from(59_999.0).unwrap());
    }
}
