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

//! Canonical order status derivation.
//!
//! The venue reports order progress through three noisy signals: `ordStatus`,
//! `execType` and the `(cumQty, leavesQty)` pair. Each contributes a candidate
//! status; the highest-priority candidate wins, and terminal statuses never
//! regress (a late trade may still upgrade Canceled to Filled).

use crate::common::enums::{BitmexExecType, BitmexOrderStatus, OrderStatus};

/// Derives the next canonical status from the wire signals.
///
/// Returns `None` when no signal yields a candidate or the candidate is
/// rejected by terminal protection; the caller keeps `prev` unchanged.
#[must_use]
pub fn derive_order_status(
    ord_status: Option<BitmexOrderStatus>,
    exec_type: Option<BitmexExecType>,
    cum_qty: Option<f64>,
    leaves_qty: Option<f64>,
    prev: Option<OrderStatus>,
) -> Option<OrderStatus> {
    let from_status = ord_status.and_then(candidate_from_ord_status);
    let from_qty = candidate_from_quantities(ord_status, cum_qty, leaves_qty);
    let from_exec = exec_type.and_then(|et| candidate_from_exec_type(et, from_status, from_qty));

    let next = [from_status, from_qty, from_exec]
        .into_iter()
        .flatten()
        .max_by_key(OrderStatus::priority)?;

    match prev {
        Some(prev) if prev.is_terminal() => {
            // Only a terminal upgrade is allowed, e.g. Canceled -> Filled on a
            // late trade
            if next.is_terminal() && next.priority() >= prev.priority() {
                Some(next)
            } else {
                None
            }
        }
        _ => Some(next),
    }
}

const fn candidate_from_ord_status(status: BitmexOrderStatus) -> Option<OrderStatus> {
    Some(match status {
        BitmexOrderStatus::New | BitmexOrderStatus::Triggered => OrderStatus::Placed,
        BitmexOrderStatus::PartiallyFilled => OrderStatus::PartiallyFilled,
        BitmexOrderStatus::Filled => OrderStatus::Filled,
        BitmexOrderStatus::PendingCancel => OrderStatus::Canceling,
        BitmexOrderStatus::Canceled => OrderStatus::Canceled,
        BitmexOrderStatus::Rejected => OrderStatus::Rejected,
        BitmexOrderStatus::Expired => OrderStatus::Expired,
    })
}

fn candidate_from_quantities(
    ord_status: Option<BitmexOrderStatus>,
    cum_qty: Option<f64>,
    leaves_qty: Option<f64>,
) -> Option<OrderStatus> {
    let filled = cum_qty.is_some_and(|cum| cum > 0.0);
    let exhausted = leaves_qty.is_some_and(|leaves| leaves <= 0.0);

    if filled && exhausted {
        return Some(OrderStatus::Filled);
    }
    if filled {
        return Some(OrderStatus::PartiallyFilled);
    }
    if ord_status == Some(BitmexOrderStatus::PartiallyFilled) && exhausted {
        return Some(OrderStatus::PartiallyFilled);
    }
    if ord_status == Some(BitmexOrderStatus::Filled) {
        return Some(OrderStatus::Filled);
    }
    None
}

fn candidate_from_exec_type(
    exec_type: BitmexExecType,
    from_status: Option<OrderStatus>,
    from_qty: Option<OrderStatus>,
) -> Option<OrderStatus> {
    let says = |status: OrderStatus| from_status == Some(status) || from_qty == Some(status);

    match exec_type {
        BitmexExecType::Trade => {
            if says(OrderStatus::Filled) {
                Some(OrderStatus::Filled)
            } else {
                Some(OrderStatus::PartiallyFilled)
            }
        }
        BitmexExecType::Canceled => {
            if says(OrderStatus::Filled) {
                Some(OrderStatus::Filled)
            } else {
                Some(OrderStatus::Canceled)
            }
        }
        BitmexExecType::Expired => Some(OrderStatus::Expired),
        BitmexExecType::New | BitmexExecType::TriggeredOrActivatedBySystem => {
            if says(OrderStatus::PartiallyFilled) {
                Some(OrderStatus::PartiallyFilled)
            } else {
                Some(OrderStatus::Placed)
            }
        }
        BitmexExecType::Restated | BitmexExecType::Calculated => {
            if says(OrderStatus::Filled) {
                Some(OrderStatus::Filled)
            } else if says(OrderStatus::PartiallyFilled) {
                Some(OrderStatus::PartiallyFilled)
            } else {
                None
            }
        }
        BitmexExecType::Settlement => {
            if says(OrderStatus::Filled) {
                Some(OrderStatus::Filled)
            } else {
                None
            }
        }
        _ => None,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
