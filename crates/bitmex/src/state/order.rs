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

//! The order entity and its merge semantics.
//!
//! Orders accumulate state from REST acknowledgements, WebSocket order rows
//! and execution rows, which may arrive in any interleaving. Merging is
//! idempotent: executions deduplicate by `execID`, the filled quantity never
//! decreases, and the canonical status honors terminal protection.

use chrono::{DateTime, Utc};
use ustr::Ustr;

use super::status::derive_order_status;
use crate::{
    common::enums::{
        BitmexExecInstruction, BitmexExecType, BitmexLiquidityIndicator, BitmexOrderStatus,
        BitmexOrderType, BitmexSide, BitmexTimeInForce, OrderStatus,
    },
    events::diff_fields,
    http::models::BitmexHttpOrder,
    websocket::messages::{BitmexExecutionMsg, BitmexOrderMsg},
};

/// A single fill event attributed to an order.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionFill {
    /// Exchange-assigned execution id, unique per fill event.
    pub exec_id: Ustr,
    /// Execution timestamp.
    pub ts: Option<DateTime<Utc>>,
    /// Filled quantity of this event.
    pub qty: f64,
    /// Fill price of this event.
    pub price: Option<f64>,
    /// Maker/taker indicator.
    pub liquidity: Option<BitmexLiquidityIndicator>,
}

/// An order as maintained locally, identified by the server-assigned id.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub order_id: Ustr,
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub status: OrderStatus,
    pub side: Option<BitmexSide>,
    pub ord_type: Option<BitmexOrderType>,
    pub time_in_force: Option<BitmexTimeInForce>,
    pub exec_inst: Vec<BitmexExecInstruction>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub quantity: Option<f64>,
    pub leaves_qty: Option<f64>,
    pub filled_qty: f64,
    pub avg_fill_price: Option<f64>,
    pub text: Option<Ustr>,
    pub created_ts: Option<DateTime<Utc>>,
    pub last_update_ts: Option<DateTime<Utc>>,
    /// Fill events in arrival order, deduplicated by `exec_id`.
    pub executions: Vec<ExecutionFill>,
}

impl Order {
    /// Creates a new [`Order`] instance in the initial status.
    #[must_use]
    pub fn new(order_id: Ustr) -> Self {
        Self {
            order_id,
            cl_ord_id: None,
            account: None,
            symbol: None,
            status: OrderStatus::Placed,
            side: None,
            ord_type: None,
            time_in_force: None,
            exec_inst: Vec::new(),
            price: None,
            stop_price: None,
            quantity: None,
            leaves_qty: None,
            filled_qty: 0.0,
            avg_fill_price: None,
            text: None,
            created_ts: None,
            last_update_ts: None,
            executions: Vec::new(),
        }
    }

    /// Applies a patch, merging executions and deriving the canonical status.
    ///
    /// Only fields present in the patch are written. Returns `true` if any
    /// observable field changed.
    pub fn apply(&mut self, patch: &OrderPatch) -> bool {
        let before = self.clone();

        if let Some(fill) = &patch.execution {
            self.merge_execution(fill.clone());
        }

        if let Some(next) = derive_order_status(
            patch.ord_status,
            patch.exec_type,
            patch.cum_qty.or(Some(self.filled_qty)),
            patch.leaves_qty.or(self.leaves_qty),
            Some(self.status),
        ) {
            self.status = next;
        }

        if let Some(v) = patch.cl_ord_id {
            self.cl_ord_id = Some(v);
        }
        if let Some(v) = patch.account {
            self.account = Some(v);
        }
        if let Some(v) = patch.symbol {
            self.symbol = Some(v);
        }
        if let Some(v) = patch.side {
            self.side = Some(v);
        }
        if let Some(v) = patch.ord_type {
            self.ord_type = Some(v);
        }
        if let Some(v) = patch.time_in_force {
            self.time_in_force = Some(v);
        }
        if let Some(v) = &patch.exec_inst {
            self.exec_inst = v.clone();
        }
        if let Some(v) = patch.price {
            self.price = Some(v);
        }
        if let Some(v) = patch.stop_price {
            self.stop_price = Some(v);
        }
        if let Some(v) = patch.quantity {
            self.quantity = Some(v);
        }
        if let Some(v) = patch.leaves_qty {
            self.leaves_qty = Some(v);
        }
        if let Some(v) = patch.text {
            self.text = Some(v);
        }

        // An explicit cumQty overrides the execution sum but never regresses
        if let Some(cum) = patch.cum_qty
            && cum > self.filled_qty
        {
            self.filled_qty = cum;
        }

        if let Some(avg) = patch.avg_px {
            self.avg_fill_price = Some(avg);
        } else if patch.execution.is_some() {
            self.avg_fill_price = self.computed_avg_fill_price();
        }

        if let Some(ts) = patch.timestamp {
            if self.created_ts.is_none() {
                self.created_ts = Some(ts);
            }
            if self.last_update_ts.is_none_or(|prev| ts > prev) {
                self.last_update_ts = Some(ts);
            }
        }

        *self != before
    }

    /// Merges a fill event, ignoring duplicates by `exec_id`.
    fn merge_execution(&mut self, fill: ExecutionFill) {
        if self.executions.iter().any(|e| e.exec_id == fill.exec_id) {
            tracing::debug!(
                order_id = %self.order_id,
                exec_id = %fill.exec_id,
                "Duplicate execution ignored",
            );
            return;
        }
        self.executions.push(fill);

        let summed: f64 = self.executions.iter().map(|e| e.qty).sum();
        if summed > self.filled_qty {
            self.filled_qty = summed;
        }
    }

    /// Quantity-weighted average price over priced executions.
    fn computed_avg_fill_price(&self) -> Option<f64> {
        let mut qty = 0.0;
        let mut notional = 0.0;
        for fill in &self.executions {
            if let Some(price) = fill.price {
                qty += fill.qty;
                notional += fill.qty * price;
            }
        }
        if qty > 0.0 {
            Some(notional / qty)
        } else {
            self.avg_fill_price
        }
    }

    /// Field names differing between two snapshots, for diff events.
    #[must_use]
    pub fn changed_fields(prev: &Self, next: &Self) -> Vec<&'static str> {
        diff_fields!(
            prev,
            next,
            [
                cl_ord_id,
                account,
                symbol,
                status,
                side,
                ord_type,
                time_in_force,
                exec_inst,
                price,
                stop_price,
                quantity,
                leaves_qty,
                filled_qty,
                avg_fill_price,
                text,
                last_update_ts,
                executions,
            ]
        )
    }
}

/// A normalized sparse patch applied onto an [`Order`].
///
/// Both wire surfaces produce the same patch shape, which keeps REST-ack and
/// WebSocket merges commutative.
#[derive(Clone, Debug, Default)]
pub struct OrderPatch {
    pub order_id: Ustr,
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub ord_type: Option<BitmexOrderType>,
    pub time_in_force: Option<BitmexTimeInForce>,
    pub exec_inst: Option<Vec<BitmexExecInstruction>>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub quantity: Option<f64>,
    pub leaves_qty: Option<f64>,
    pub cum_qty: Option<f64>,
    pub avg_px: Option<f64>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub exec_type: Option<BitmexExecType>,
    pub text: Option<Ustr>,
    pub timestamp: Option<DateTime<Utc>>,
    pub execution: Option<ExecutionFill>,
}

impl From<&BitmexOrderMsg> for OrderPatch {
    fn from(msg: &BitmexOrderMsg) -> Self {
        Self {
            order_id: msg.order_id,
            cl_ord_id: msg.cl_ord_id,
            account: msg.account,
            symbol: msg.symbol,
            side: msg.side,
            ord_type: msg.ord_type,
            time_in_force: msg.time_in_force,
            exec_inst: msg.exec_inst.clone(),
            price: msg.price,
            stop_price: msg.stop_px,
            quantity: msg.order_qty,
            leaves_qty: msg.leaves_qty,
            cum_qty: msg.cum_qty,
            avg_px: msg.avg_px,
            ord_status: msg.ord_status,
            exec_type: None,
            text: msg.text,
            timestamp: msg.timestamp.or(msg.transact_time),
            execution: None,
        }
    }
}

impl From<&BitmexExecutionMsg> for OrderPatch {
    fn from(msg: &BitmexExecutionMsg) -> Self {
        let execution = match (msg.exec_id, msg.exec_type) {
            (Some(exec_id), Some(BitmexExecType::Trade)) => msg.last_qty.map(|qty| ExecutionFill {
                exec_id,
                ts: msg.transact_time.or(msg.timestamp),
                qty,
                price: msg.last_px,
                liquidity: msg.last_liquidity_ind,
            }),
            _ => None,
        };

        Self {
            order_id: msg.order_id.unwrap_or_default(),
            cl_ord_id: msg.cl_ord_id,
            account: msg.account,
            symbol: msg.symbol,
            side: msg.side,
            ord_type: msg.ord_type,
            time_in_force: msg.time_in_force,
            exec_inst: msg.exec_inst.clone(),
            price: msg.price,
            stop_price: msg.stop_px,
            quantity: msg.order_qty,
            leaves_qty: msg.leaves_qty,
            cum_qty: msg.cum_qty,
            avg_px: msg.avg_px,
            ord_status: msg.ord_status,
            exec_type: msg.exec_type,
            text: msg.text,
            timestamp: msg.timestamp.or(msg.transact_time),
            execution,
        }
    }
}

impl From<&BitmexHttpOrder> for OrderPatch {
    fn from(row: &BitmexHttpOrder) -> Self {
        let exec_inst = row.exec_inst.map(|joined| {
            joined
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| match s.trim() {
                    "ParticipateDoNotInitiate" => BitmexExecInstruction::ParticipateDoNotInitiate,
                    "ReduceOnly" => BitmexExecInstruction::ReduceOnly,
                    "AllOrNone" => BitmexExecInstruction::AllOrNone,
                    "MarkPrice" => BitmexExecInstruction::MarkPrice,
                    "IndexPrice" => BitmexExecInstruction::IndexPrice,
                    "LastPrice" => BitmexExecInstruction::LastPrice,
                    "Close" => BitmexExecInstruction::Close,
                    "Fixed" => BitmexExecInstruction::Fixed,
                    _ => BitmexExecInstruction::Unknown,
                })
                .collect()
        });
        let exec_type = row
            .exec_type
            .and_then(|s| s.as_str().parse::<BitmexExecType>().ok());

        Self {
            order_id: row.order_id,
            cl_ord_id: row.cl_ord_id,
            account: row.account,
            symbol: row.symbol,
            side: row.side,
            ord_type: row.ord_type,
            time_in_force: row.time_in_force,
            exec_inst,
            price: row.price,
            stop_price: row.stop_px,
            quantity: row.order_qty,
            leaves_qty: row.leaves_qty,
            cum_qty: row.cum_qty,
            avg_px: row.avg_px,
            ord_status: row.ord_status,
            exec_type,
            text: row.text,
            timestamp: row.timestamp.or(row.transact_time),
            execution: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
