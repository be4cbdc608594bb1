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

//! BitMEX WebSocket message structures and helper types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use strum::Display;
use ustr::Ustr;

use super::enums::{BitmexAction, BitmexWsAuthAction, BitmexWsOperation};
use crate::common::enums::{
    BitmexExecInstruction, BitmexExecType, BitmexInstrumentState, BitmexLiquidityIndicator,
    BitmexOrderStatus, BitmexOrderType, BitmexSide, BitmexTimeInForce,
};

/// Custom deserializer accepting either a JSON string or number.
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Custom deserializer for comma-separated `ExecInstruction` values.
fn deserialize_exec_instructions<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<BitmexExecInstruction>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        None => Ok(None),
        Some(ref s) if s.is_empty() => Ok(None),
        Some(s) => {
            let instructions = s
                .split(',')
                .map(|inst| match inst.trim() {
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
                .collect();
            Ok(Some(instructions))
        }
    }
}

/// BitMEX WebSocket authentication message.
///
/// The args array contains [api_key, expires, signature]. The second element
/// must be a number (not a string) for the venue to accept it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitmexAuthentication {
    pub op: BitmexWsAuthAction,
    pub args: (String, i64, String),
}

/// BitMEX WebSocket subscription message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitmexSubscription {
    pub op: BitmexWsOperation,
    pub args: Vec<Ustr>,
}

/// Original request metadata echoed back in acks and errors.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BitmexWsRequest {
    pub op: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl BitmexWsRequest {
    /// Returns `true` if this request was an `authKeyExpires` submission.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.op == "authKeyExpires"
    }
}

/// Rate limit information from the welcome frame.
#[derive(Clone, Debug, Deserialize)]
pub struct BitmexRateLimit {
    /// Number of requests remaining in the current time window.
    pub remaining: Option<i32>,
}

/// Represents all possible message types from the BitMEX WebSocket API.
#[derive(Debug, Display, Deserialize)]
#[serde(untagged)]
pub enum BitmexWsMessage {
    /// Table websocket message.
    Table(BitmexTableMessage),
    /// Initial welcome message received when connecting to the WebSocket.
    Welcome {
        /// Welcome message text.
        info: String,
        /// API version, string or numeric on the wire.
        #[serde(deserialize_with = "deserialize_string_or_number")]
        version: String,
        /// Server timestamp.
        timestamp: Option<DateTime<Utc>>,
        /// Link to API documentation.
        docs: Option<String>,
        /// Rate limit information.
        limit: Option<BitmexRateLimit>,
    },
    /// Subscription/authentication acknowledgement.
    Subscription {
        /// Whether the request was successful.
        success: bool,
        /// The confirmed topic for subscribe acks.
        subscribe: Option<String>,
        /// The confirmed topic for unsubscribe acks.
        unsubscribe: Option<String>,
        /// Original request metadata.
        request: Option<BitmexWsRequest>,
    },
    /// WebSocket error message.
    Error {
        /// HTTP-style status code accompanying the error.
        status: Option<u16>,
        /// Error description.
        error: String,
        /// Original request metadata.
        request: Option<BitmexWsRequest>,
    },
}

/// Represents table-based messages.
#[derive(Debug, Display, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(tag = "table")]
pub enum BitmexTableMessage {
    Instrument {
        action: BitmexAction,
        data: Vec<BitmexInstrumentMsg>,
    },
    Trade {
        action: BitmexAction,
        data: Vec<BitmexTradeMsg>,
    },
    OrderBookL2 {
        action: BitmexAction,
        data: Vec<BitmexOrderBookMsg>,
    },
    Order {
        action: BitmexAction,
        data: Vec<BitmexOrderMsg>,
    },
    Execution {
        action: BitmexAction,
        data: Vec<BitmexExecutionMsg>,
    },
    Position {
        action: BitmexAction,
        data: Vec<BitmexPositionMsg>,
    },
    Wallet {
        action: BitmexAction,
        data: Vec<BitmexWalletMsg>,
    },
    Margin {
        action: BitmexAction,
        data: Vec<BitmexMarginMsg>,
    },
    Liquidation {
        action: BitmexAction,
        data: Vec<BitmexLiquidationMsg>,
    },
    Settlement {
        action: BitmexAction,
        data: Vec<BitmexSettlementMsg>,
    },
    Transact {
        action: BitmexAction,
        data: Vec<BitmexTransactMsg>,
    },
}

/// Represents an instrument row.
///
/// Only fields present in the payload are applied; update rows carry a sparse
/// subset of the partial/insert shape.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexInstrumentMsg {
    /// The instrument symbol (e.g., "XBTUSD").
    pub symbol: Ustr,
    /// Instrument lifecycle state.
    pub state: Option<BitmexInstrumentState>,
    /// Product type (e.g., "FFWCSX" for perpetuals).
    pub typ: Option<Ustr>,
    /// Base currency of the contract.
    pub underlying: Option<Ustr>,
    /// Quote currency of the contract.
    pub quote_currency: Option<Ustr>,
    /// Minimum order increment in contracts.
    pub lot_size: Option<f64>,
    /// Minimum price increment.
    pub tick_size: Option<f64>,
    /// Contract multiplier.
    pub multiplier: Option<f64>,
    /// Mark price.
    pub mark_price: Option<f64>,
    /// Indicative settle (index) price.
    pub indicative_settle_price: Option<f64>,
    /// Last traded price.
    pub last_price: Option<f64>,
    /// Percentage change since the prior session.
    pub last_change_pcnt: Option<f64>,
    /// Current funding rate.
    pub funding_rate: Option<f64>,
    /// Timestamp of the next funding.
    pub funding_timestamp: Option<DateTime<Utc>>,
    /// Funding interval.
    pub funding_interval: Option<DateTime<Utc>>,
    /// Expiry for dated contracts.
    pub expiry: Option<DateTime<Utc>>,
    /// 24h volume in contracts.
    pub volume24h: Option<f64>,
    /// 24h turnover in satoshis.
    pub turnover24h: Option<f64>,
    /// Open interest in contracts.
    pub open_interest: Option<f64>,
    /// Upper price band.
    pub limit_up_price: Option<f64>,
    /// Lower price band.
    pub limit_down_price: Option<f64>,
    /// Maximum acceptable price.
    pub max_price: Option<f64>,
    /// Timestamp of the update.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents a single trade execution.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexTradeMsg {
    /// Timestamp of the trade.
    pub timestamp: DateTime<Utc>,
    /// The instrument symbol.
    pub symbol: Ustr,
    /// Side of the trade ("Buy" or "Sell").
    pub side: BitmexSide,
    /// Size of the trade.
    pub size: f64,
    /// Price the trade executed at.
    pub price: f64,
    /// Unique trade match ID.
    #[serde(rename = "trdMatchID")]
    pub trd_match_id: Option<Ustr>,
}

/// Represents a single order book entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexOrderBookMsg {
    /// The instrument symbol (e.g., "XBTUSD").
    pub symbol: Ustr,
    /// Unique order ID.
    pub id: u64,
    /// Side of the order ("Buy" or "Sell").
    pub side: BitmexSide,
    /// Size of the order; absent for deletes.
    pub size: Option<f64>,
    /// Price level of the order; absent on size-only updates.
    pub price: Option<f64>,
}

/// Represents an order row; update rows carry a sparse subset of fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexOrderMsg {
    #[serde(rename = "orderID")]
    pub order_id: Ustr,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub order_qty: Option<f64>,
    pub price: Option<f64>,
    pub stop_px: Option<f64>,
    pub ord_type: Option<BitmexOrderType>,
    pub time_in_force: Option<BitmexTimeInForce>,
    #[serde(default, deserialize_with = "deserialize_exec_instructions")]
    pub exec_inst: Option<Vec<BitmexExecInstruction>>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub leaves_qty: Option<f64>,
    pub cum_qty: Option<f64>,
    pub avg_px: Option<f64>,
    pub text: Option<Ustr>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents an execution (fill event) row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexExecutionMsg {
    #[serde(rename = "execID")]
    pub exec_id: Option<Ustr>,
    #[serde(rename = "orderID")]
    pub order_id: Option<Ustr>,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub last_qty: Option<f64>,
    pub last_px: Option<f64>,
    pub last_liquidity_ind: Option<BitmexLiquidityIndicator>,
    pub order_qty: Option<f64>,
    pub price: Option<f64>,
    pub stop_px: Option<f64>,
    pub exec_type: Option<BitmexExecType>,
    pub ord_type: Option<BitmexOrderType>,
    pub time_in_force: Option<BitmexTimeInForce>,
    #[serde(default, deserialize_with = "deserialize_exec_instructions")]
    pub exec_inst: Option<Vec<BitmexExecInstruction>>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub leaves_qty: Option<f64>,
    pub cum_qty: Option<f64>,
    pub avg_px: Option<f64>,
    pub text: Option<Ustr>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents a position row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexPositionMsg {
    pub account: i64,
    pub symbol: Ustr,
    pub currency: Option<Ustr>,
    pub current_qty: Option<f64>,
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
    pub is_open: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents a wallet balance row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexWalletMsg {
    pub account: i64,
    pub currency: Ustr,
    pub amount: Option<f64>,
    pub pending_credit: Option<f64>,
    pub pending_debit: Option<f64>,
    pub confirmed_debit: Option<f64>,
    pub transfer_in: Option<f64>,
    pub transfer_out: Option<f64>,
    pub deposited: Option<f64>,
    pub withdrawn: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents a margin account row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexMarginMsg {
    pub account: i64,
    pub currency: Ustr,
    pub amount: Option<f64>,
    pub init_margin: Option<f64>,
    pub maint_margin: Option<f64>,
    pub margin_balance: Option<f64>,
    pub available_margin: Option<f64>,
    pub withdrawable_margin: Option<f64>,
    pub unrealised_pnl: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Represents a liquidation order row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexLiquidationMsg {
    /// Unique order ID of the liquidation.
    #[serde(rename = "orderID")]
    pub order_id: Ustr,
    /// The instrument symbol being liquidated.
    pub symbol: Option<Ustr>,
    /// Side of the liquidation ("Buy" or "Sell").
    pub side: Option<BitmexSide>,
    /// Price of the liquidation order.
    pub price: Option<f64>,
    /// Remaining quantity to be executed.
    pub leaves_qty: Option<f64>,
}

/// Represents a settlement row.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexSettlementMsg {
    /// Settlement timestamp.
    pub timestamp: DateTime<Utc>,
    /// The settled instrument symbol.
    pub symbol: Ustr,
    /// Settlement type (e.g., "Settlement").
    pub settlement_type: Option<Ustr>,
    /// Price the contract settled at.
    pub settled_price: Option<f64>,
}

/// Represents a transaction history row; deserialized but not applied.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexTransactMsg {
    #[serde(rename = "transactID")]
    pub transact_id: Ustr,
    pub account: Option<i64>,
    pub currency: Option<Ustr>,
    pub transact_type: Option<Ustr>,
    pub amount: Option<f64>,
    pub transact_status: Option<Ustr>,
    pub timestamp: Option<DateTime<Utc>>,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
