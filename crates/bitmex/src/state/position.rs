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

//! The position entity, keyed by `(account, symbol)`.

use chrono::{DateTime, Utc};
use ustr::Ustr;

use crate::{
    common::enums::BitmexSide, events::diff_fields, websocket::messages::BitmexPositionMsg,
};

/// A position as maintained locally.
///
/// `size` and `side` are derived from the signed `current_qty` after every
/// mutation: a flat position always reads `size = 0, side = Buy, qty = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub account: i64,
    pub symbol: Ustr,
    pub current_qty: f64,
    pub size: f64,
    pub side: BitmexSide,
    pub currency: Option<Ustr>,
    pub avg_entry_price: Option<f64>,
    pub avg_cost_price: Option<f64>,
    pub break_even_price: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub bankrupt_price: Option<f64>,
    pub margin_call_price: Option<f64>,
    pub init_margin: Option<f64>,
    pub maint_margin: Option<f64>,
    pub pos_margin: Option<f64>,
    pub leverage: Option<f64>,
    pub cross_margin: Option<bool>,
    pub mark_price: Option<f64>,
    pub mark_value: Option<f64>,
    pub home_notional: Option<f64>,
    pub foreign_notional: Option<f64>,
    pub unrealised_pnl: Option<f64>,
    pub unrealised_pnl_pcnt: Option<f64>,
    pub realised_pnl: Option<f64>,
    pub is_open: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Position {
    /// Composite registry key: `"<account>::<SYMBOL>"`.
    #[must_use]
    pub fn key(account: i64, symbol: &Ustr) -> String {
        format!("{account}::{symbol}")
    }

    /// Creates a new flat [`Position`] instance.
    #[must_use]
    pub fn new(account: i64, symbol: Ustr) -> Self {
        Self {
            account,
            symbol,
            current_qty: 0.0,
            size: 0.0,
            side: BitmexSide::Buy,
            currency: None,
            avg_entry_price: None,
            avg_cost_price: None,
            break_even_price: None,
            liquidation_price: None,
            bankrupt_price: None,
            margin_call_price: None,
            init_margin: None,
            maint_margin: None,
            pos_margin: None,
            leverage: None,
            cross_margin: None,
            mark_price: None,
            mark_value: None,
            home_notional: None,
            foreign_notional: None,
            unrealised_pnl: None,
            unrealised_pnl_pcnt: None,
            realised_pnl: None,
            is_open: false,
            timestamp: None,
        }
    }

    /// Applies a row, rejecting timestamps that are not strictly newer than
    /// the stored one unless `allow_older` is set (delete actions and
    /// resync pruning).
    ///
    /// Returns `true` if the row was accepted and changed the position.
    pub fn apply(&mut self, row: &BitmexPositionMsg, allow_older: bool) -> bool {
        if !allow_older
            && let (Some(stored), Some(incoming)) = (self.timestamp, row.timestamp)
            && incoming <= stored
        {
            tracing::debug!(
                account = self.account,
                symbol = %self.symbol,
                "Stale position row dropped",
            );
            return false;
        }

        let before = self.clone();

        if let Some(v) = row.current_qty {
            self.current_qty = v;
        }
        if let Some(v) = row.currency {
            self.currency = Some(v);
        }
        if let Some(v) = row.avg_entry_price {
            self.avg_entry_price = Some(v);
        }
        if let Some(v) = row.avg_cost_price {
            self.avg_cost_price = Some(v);
        }
        if let Some(v) = row.break_even_price {
            self.break_even_price = Some(v);
        }
        if let Some(v) = row.liquidation_price {
            self.liquidation_price = Some(v);
        }
        if let Some(v) = row.bankrupt_price {
            self.bankrupt_price = Some(v);
        }
        if let Some(v) = row.margin_call_price {
            self.margin_call_price = Some(v);
        }
        if let Some(v) = row.init_margin {
            self.init_margin = Some(v);
        }
        if let Some(v) = row.maint_margin {
            self.maint_margin = Some(v);
        }
        if let Some(v) = row.pos_margin {
            self.pos_margin = Some(v);
        }
        if let Some(v) = row.leverage {
            self.leverage = Some(v);
        }
        if let Some(v) = row.cross_margin {
            self.cross_margin = Some(v);
        }
        if let Some(v) = row.mark_price {
            self.mark_price = Some(v);
        }
        if let Some(v) = row.mark_value {
            self.mark_value = Some(v);
        }
        if let Some(v) = row.home_notional {
            self.home_notional = Some(v);
        }
        if let Some(v) = row.foreign_notional {
            self.foreign_notional = Some(v);
        }
        if let Some(v) = row.unrealised_pnl {
            self.unrealised_pnl = Some(v);
        }
        if let Some(v) = row.unrealised_pnl_pcnt {
            self.unrealised_pnl_pcnt = Some(v);
        }
        if let Some(v) = row.realised_pnl {
            self.realised_pnl = Some(v);
        }
        if let Some(v) = row.is_open {
            self.is_open = v;
        }
        if let Some(ts) = row.timestamp {
            self.timestamp = Some(ts);
        }

        self.derive_size_and_side();
        *self != before
    }

    /// Forces the position flat, used when a snapshot no longer carries it.
    pub fn force_flat(&mut self) {
        self.current_qty = 0.0;
        self.is_open = false;
        self.derive_size_and_side();
    }

    /// Returns `true` for a non-zero position.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current_qty != 0.0
    }

    fn derive_size_and_side(&mut self) {
        self.size = self.current_qty.abs();
        // Buy is the tie-break for a flat position
        self.side = if self.current_qty < 0.0 {
            BitmexSide::Sell
        } else {
            BitmexSide::Buy
        };
        if self.size == 0.0 {
            self.current_qty = 0.0;
        }
    }

    /// Field names differing between two snapshots, for diff events.
    #[must_use]
    pub fn changed_fields(prev: &Self, next: &Self) -> Vec<&'static str> {
        diff_fields!(
            prev,
            next,
            [
                current_qty,
                size,
                side,
                currency,
                avg_entry_price,
                liquidation_price,
                init_margin,
                maint_margin,
                leverage,
                mark_price,
                home_notional,
                foreign_notional,
                unrealised_pnl,
                realised_pnl,
                is_open,
                timestamp,
            ]
        )
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
