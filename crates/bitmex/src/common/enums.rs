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

//! Enumerations shared across the BitMEX REST and WebSocket surfaces, plus the
//! canonical order status set maintained locally.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Side of an order or trade.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexSide {
    /// Buy side of the trade/order.
    #[default]
    Buy,
    /// Sell side of the trade/order.
    Sell,
}

impl BitmexSide {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order status as reported on the wire (`ordStatus`).
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexOrderStatus {
    /// Order has been placed but not yet processed.
    New,
    /// Order has been partially filled.
    PartiallyFilled,
    /// Order has been completely filled.
    Filled,
    /// Order cancellation is pending.
    PendingCancel,
    /// Order has been canceled by user or system.
    Canceled,
    /// Order was rejected by the system.
    Rejected,
    /// Order has expired according to its time in force.
    Expired,
    /// Stop order has been triggered and is now working.
    Triggered,
}

/// Execution type reported on execution rows (`execType`).
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexExecType {
    /// New order placed.
    New,
    /// Normal trade execution.
    Trade,
    /// Order canceled.
    Canceled,
    /// Order replaced.
    Replaced,
    /// Order rejected.
    Rejected,
    /// Order expired per its time in force.
    Expired,
    /// Order state restated by the venue.
    Restated,
    /// Order state recalculated by the venue.
    Calculated,
    /// Funding rate execution.
    Funding,
    /// Settlement execution.
    Settlement,
    /// Stop/trigger order activated by system.
    TriggeredOrActivatedBySystem,
    /// Order suspended.
    Suspended,
    /// Order released.
    Released,
    /// Any execution type not modeled above.
    #[serde(other)]
    Unknown,
}

/// Order type accepted by the venue (`ordType`).
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexOrderType {
    /// Immediate execution at the best available price.
    #[default]
    Market,
    /// Execution at the stated price or better.
    Limit,
    /// Market order armed at a trigger price.
    Stop,
    /// Limit order armed at a trigger price.
    StopLimit,
    /// Market order triggered when price touches the stated level.
    MarketIfTouched,
    /// Limit order triggered when price touches the stated level.
    LimitIfTouched,
    /// Pegged order tracking a reference price.
    Pegged,
}

/// Time in force accepted by the venue (`timeInForce`).
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexTimeInForce {
    /// Valid for the trading day.
    Day,
    /// Valid until canceled.
    GoodTillCancel,
    /// Fill what is possible immediately, cancel the rest.
    ImmediateOrCancel,
    /// Fill completely immediately or cancel.
    FillOrKill,
}

impl BitmexTimeInForce {
    /// Expands the conventional short form (`GTC`, `IOC`, `FOK`, `DAY`),
    /// also accepting the venue's long form verbatim.
    #[must_use]
    pub fn from_short_form(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GTC" | "GOODTILLCANCEL" => Some(Self::GoodTillCancel),
            "IOC" | "IMMEDIATEORCANCEL" => Some(Self::ImmediateOrCancel),
            "FOK" | "FILLORKILL" => Some(Self::FillOrKill),
            "DAY" => Some(Self::Day),
            _ => None,
        }
    }
}

/// Execution instruction flags (`execInst`), sent comma-joined.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexExecInstruction {
    /// Post-only: cancel rather than take liquidity.
    ParticipateDoNotInitiate,
    /// Reduce-only: never increase a position.
    ReduceOnly,
    /// All or none.
    AllOrNone,
    /// Trigger against the mark price.
    MarkPrice,
    /// Trigger against the index price.
    IndexPrice,
    /// Trigger against the last trade price.
    LastPrice,
    /// Close the position.
    Close,
    /// Fixed offset for pegged orders.
    Fixed,
    /// Any instruction not modeled above.
    #[serde(other)]
    Unknown,
}

/// Indicates whether an execution added or removed liquidity.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum BitmexLiquidityIndicator {
    /// Maker: the execution added liquidity.
    AddedLiquidity,
    /// Taker: the execution removed liquidity.
    RemovedLiquidity,
}

/// Trading instrument state.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BitmexInstrumentState {
    /// Instrument is available for trading.
    Open,
    /// Instrument is not currently trading.
    Closed,
    /// Instrument has settled.
    Settled,
    /// Instrument is in settlement.
    Settling,
    /// Instrument is not listed.
    Unlisted,
    /// Instrument has been removed from the venue.
    Delisted,
}

/// Canonical order status maintained locally.
///
/// Derivation from the wire signals applies a priority lattice with terminal
/// protection; see [`crate::state::status`].
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum OrderStatus {
    /// Working at the venue, nothing filled yet.
    Placed,
    /// Working at the venue with a non-zero filled quantity.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancel requested, not yet confirmed.
    Canceling,
    /// Canceled at the venue.
    Canceled,
    /// Rejected by the venue.
    Rejected,
    /// Expired per its time in force.
    Expired,
}

impl OrderStatus {
    /// Rank in the derivation lattice; higher wins.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Filled => 6,
            Self::PartiallyFilled => 5,
            Self::Rejected => 4,
            Self::Canceled | Self::Expired => 3,
            Self::Canceling => 2,
            Self::Placed => 1,
        }
    }

    /// Returns `true` for statuses from which normal progress is not expected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Rejected | Self::Expired | Self::Canceled
        )
    }

    /// Returns `true` for statuses counted into the active-order index.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Placed | Self::PartiallyFilled | Self::Canceling)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
