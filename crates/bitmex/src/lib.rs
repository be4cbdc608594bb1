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

//! Realtime exchange-state hub and order gateway for the [BitMEX](https://bitmex.com)
//! derivatives exchange.
//!
//! The `bitmex-hub` crate maintains a locally consistent, query-able view of
//! exchange state (instruments, order books, trades, wallets, positions,
//! orders) from the realtime WebSocket table stream, and places, amends and
//! reconciles client-initiated orders over the signed REST API. It survives
//! connection loss, authentication failures and races between REST
//! acknowledgements and WebSocket notifications.
//!
//! The official BitMEX API reference can be found at
//! <https://www.bitmex.com/app/apiOverview>.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod http;
pub mod state;
pub mod websocket;

// Re-exports
pub use crate::{
    client::BitmexClient,
    common::enums::{BitmexOrderType, BitmexSide, OrderStatus},
    config::BitmexClientConfig,
    error::{BitmexAuthReason, BitmexError},
    execution::{PlaceOptions, PlaceRequest, validate_place_input},
    http::{client::BitmexHttpClient, error::BitmexHttpError},
    websocket::{client::BitmexWebSocketClient, error::BitmexWsError},
};
