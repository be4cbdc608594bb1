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

//! The instrument entity: typed contract state plus a bounded trades buffer.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ustr::Ustr;

use crate::{
    common::enums::{BitmexInstrumentState, BitmexSide},
    events::diff_fields,
    websocket::messages::{BitmexInstrumentMsg, BitmexTradeMsg},
};

/// Maximum trades retained per instrument.
pub const TRADES_BUFFER_LIMIT: usize = 1_000;

/// Price band limits published by the venue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceFilter {
    pub limit_up: Option<f64>,
    pub limit_down: Option<f64>,
    pub max_price: Option<f64>,
}

/// A public trade retained in the instrument's FIFO buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentTrade {
    pub ts: DateTime<Utc>,
    pub side: BitmexSide,
    pub size: f64,
    pub price: f64,
    pub trd_match_id: Option<Ustr>,
}

/// An instrument as maintained locally.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    /// Native venue symbol, e.g. `XBTUSD`.
    pub symbol: Ustr,
    /// Unified lowercase symbol derived through the alias mapping.
    pub unified_symbol: Ustr,
    pub state: BitmexInstrumentState,
    pub product_type: Option<Ustr>,
    /// Base currency, lowercased.
    pub base_currency: Option<Ustr>,
    /// Quote currency, lowercased.
    pub quote_currency: Option<Ustr>,
    pub lot_size: Option<f64>,
    pub tick_size: Option<f64>,
    pub multiplier: Option<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub last_price: Option<f64>,
    pub last_change_pcnt: Option<f64>,
    pub funding_rate: Option<f64>,
    pub funding_timestamp: Option<DateTime<Utc>>,
    pub funding_interval: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub volume24h: Option<f64>,
    pub turnover24h: Option<f64>,
    pub open_interest: Option<f64>,
    pub price_filter: PriceFilter,
    pub last_update_ts: Option<DateTime<Utc>>,
    /// Recent trades, oldest first, bounded by [`TRADES_BUFFER_LIMIT`].
    pub trades: VecDeque<InstrumentTrade>,
}

impl Instrument {
    /// Creates a new [`Instrument`] instance.
    #[must_use]
    pub fn new(symbol: Ustr, unified_symbol: Ustr) -> Self {
        Self {
            symbol,
            unified_symbol,
            state: BitmexInstrumentState::Open,
            product_type: None,
            base_currency: None,
            quote_currency: None,
            lot_size: None,
            tick_size: None,
            multiplier: None,
            mark_price: None,
            index_price: None,
            last_price: None,
            last_change_pcnt: None,
            funding_rate: None,
            funding_timestamp: None,
            funding_interval: None,
            expiry: None,
            volume24h: None,
            turnover24h: None,
            open_interest: None,
            price_filter: PriceFilter::default(),
            last_update_ts: None,
            trades: VecDeque::new(),
        }
    }

    /// Returns `true` once the instrument has been removed from the venue.
    ///
    /// A delisted instrument ignores increments until an insert or partial
    /// revives it with fresh field values.
    #[must_use]
    pub fn is_delisted(&self) -> bool {
        self.state == BitmexInstrumentState::Delisted
    }

    /// Applies a row field-by-field; absent keys leave fields untouched.
    ///
    /// Returns `true` if any observable field changed.
    pub fn apply(&mut self, row: &BitmexInstrumentMsg) -> bool {
        let before = self.clone();

        if let Some(v) = row.state {
            self.state = v;
        }
        if let Some(v) = row.typ {
            self.product_type = Some(v);
        }
        if let Some(v) = row.underlying {
            self.base_currency = Some(Ustr::from(&v.as_str().to_ascii_lowercase()));
        }
        if let Some(v) = row.quote_currency {
            self.quote_currency = Some(Ustr::from(&v.as_str().to_ascii_lowercase()));
        }
        if let Some(v) = row.lot_size {
            self.lot_size = Some(v);
        }
        if let Some(v) = row.tick_size {
            self.tick_size = Some(v);
        }
        if let Some(v) = row.multiplier {
            self.multiplier = Some(v);
        }
        if let Some(v) = row.mark_price {
            self.mark_price = Some(v);
        }
        if let Some(v) = row.indicative_settle_price {
            self.index_price = Some(v);
        }
        if let Some(v) = row.last_price {
            self.last_price = Some(v);
        }
        if let Some(v) = row.last_change_pcnt {
            self.last_change_pcnt = Some(v);
        }
        if let Some(v) = row.funding_rate {
            self.funding_rate = Some(v);
        }
        if let Some(v) = row.funding_timestamp {
            self.funding_timestamp = Some(v);
        }
        if let Some(v) = row.funding_interval {
            self.funding_interval = Some(v);
        }
        if let Some(v) = row.expiry {
            self.expiry = Some(v);
        }
        if let Some(v) = row.volume24h {
            self.volume24h = Some(v);
        }
        if let Some(v) = row.turnover24h {
            self.turnover24h = Some(v);
        }
        if let Some(v) = row.open_interest {
            self.open_interest = Some(v);
        }
        if let Some(v) = row.limit_up_price {
            self.price_filter.limit_up = Some(v);
        }
        if let Some(v) = row.limit_down_price {
            self.price_filter.limit_down = Some(v);
        }
        if let Some(v) = row.max_price {
            self.price_filter.max_price = Some(v);
        }
        if let Some(ts) = row.timestamp {
            self.last_update_ts = Some(ts);
        }

        *self != before
    }

    /// Pushes a trade into the bounded FIFO buffer.
    pub fn push_trade(&mut self, msg: &BitmexTradeMsg) {
        if self.trades.len() == TRADES_BUFFER_LIMIT {
            self.trades.pop_front();
        }
        self.trades.push_back(InstrumentTrade {
            ts: msg.timestamp,
            side: msg.side,
            size: msg.size,
            price: msg.price,
            trd_match_id: msg.trd_match_id,
        });
        self.last_price = Some(msg.price);
    }

    /// Field names differing between two snapshots, for diff events.
    #[must_use]
    pub fn changed_fields(prev: &Self, next: &Self) -> Vec<&'static str> {
        diff_fields!(
            prev,
            next,
            [
                state,
                product_type,
                base_currency,
                quote_currency,
                lot_size,
                tick_size,
                multiplier,
                mark_price,
                index_price,
                last_price,
                last_change_pcnt,
                funding_rate,
                funding_timestamp,
                expiry,
                volume24h,
                turnover24h,
                open_interest,
                price_filter,
                last_update_ts,
            ]
        )
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn instrument() -> Instrument {
        Instrument::new(Ustr::from("XBTUSD"), Ustr::from("btcusdt"))
    }

    fn trade(price: f64) -> BitmexTradeMsg {
        serde_json::from_value(serde_json::json!({
            "timestamp": "2024-01-05T00:01:20Z",
            "symbol": "XBTUSD",
            "side": "Buy",
            "size": 100,
            "price": price,
        }))
        .unwrap()
    }

    #[rstest]
    fn test_apply_only_present_fields() {
        let mut inst = instrument();
        let row: BitmexInstrumentMsg = serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "markPrice": 60123.5,
            "limitUpPrice": 66000,
        }))
        .unwrap();

        assert!(inst.apply(&row));
        assert_eq!(inst.mark_price, Some(60_123.5));
        assert_eq!(inst.price_filter.limit_up, Some(66_000.0));

        // A sparse update leaves unrelated fields alone
        let update: BitmexInstrumentMsg = serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "lastPrice": 60200,
        }))
        .unwrap();
        inst.apply(&update);
        assert_eq!(inst.mark_price, Some(60_123.5));
        assert_eq!(inst.last_price, Some(60_200.0));
    }

    #[rstest]
    fn test_currencies_lowercased() {
        let mut inst = instrument();
        let row: BitmexInstrumentMsg = serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "underlying": "XBT",
            "quoteCurrency": "USD",
        }))
        .unwrap();
        inst.apply(&row);

        assert_eq!(inst.base_currency, Some(Ustr::from("xbt")));
        assert_eq!(inst.quote_currency, Some(Ustr::from("usd")));
    }

    #[rstest]
    fn test_trades_buffer_bounded() {
        let mut inst = instrument();
        for i in 0..(TRADES_BUFFER_LIMIT + 10) {
            inst.push_trade(&trade(60_000.0 + i as f64));
        }

        assert_eq!(inst.trades.len(), TRADES_BUFFER_LIMIT);
        // Oldest entries were evicted
        assert_eq!(inst.trades.front().unwrap().price, 60_010.0);
        assert_eq!(inst.last_price, Some(60_000.0 + (TRADES_BUFFER_LIMIT + 9) as f64));
    }

    #[rstest]
    fn test_delisted_latch() {
        let mut inst = instrument();
        let row: BitmexInstrumentMsg = serde_json::from_value(serde_json::json!({
            "symbol": "XBTUSD",
            "state": "delisted",
        }))
        .unwrap();
        inst.apply(&row);
        assert!(inst.is_delisted());
    }
}
