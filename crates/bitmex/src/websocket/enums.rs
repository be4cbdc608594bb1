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

//! Enumerations used when parsing BitMEX WebSocket payloads.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Action type for table data messages.
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
pub enum BitmexAction {
    /// Initial snapshot of table data.
    Partial,
    /// New data inserted.
    Insert,
    /// Update to existing data.
    Update,
    /// Existing data deleted.
    Delete,
}

/// Operation type for WebSocket channel commands.
#[derive(
    Clone, Debug, Display, PartialEq, Eq, AsRefStr, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BitmexWsOperation {
    /// Subscribe to one or more topics.
    Subscribe,
    /// Unsubscribe from one or more topics.
    Unsubscribe,
}

/// Authentication action types for WebSocket commands.
#[derive(
    Clone, Debug, Display, PartialEq, Eq, AsRefStr, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BitmexWsAuthAction {
    /// Submit API key with expires for authentication.
    AuthKeyExpires,
}

/// Represents possible WebSocket topics that can be subscribed to.
#[derive(
    Clone, Debug, Display, PartialEq, Eq, AsRefStr, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BitmexWsTopic {
    /// Instrument updates including mark and index prices.
    Instrument,
    /// Live trades.
    Trade,
    /// Full level 2 orderbook.
    OrderBookL2,
    /// Liquidation orders as they're entered into the book.
    Liquidation,
    /// Settlement price updates.
    Settlement,
    /// Order updates for the authenticated account.
    Order,
    /// Execution/fill updates for the authenticated account.
    Execution,
    /// Position updates for the authenticated account.
    Position,
    /// Margin updates for the authenticated account.
    Margin,
    /// Wallet updates for the authenticated account.
    Wallet,
    /// Transaction history for the authenticated account.
    Transact,
}

/// Whether an authentication attempt was initiated by the caller or by the
/// reconnect path; drives logging, metrics labels and the retry policy.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AuthSource {
    /// Explicit `login` call.
    Manual,
    /// Automatic re-login after a reconnect.
    Reconnect,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
