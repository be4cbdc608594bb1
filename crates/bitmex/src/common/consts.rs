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

//! Constants for the BitMEX hub: venue name, endpoints and the private channel table.

pub const BITMEX: &str = "BITMEX";

pub const BITMEX_WS_URL: &str = "wss://ws.bitmex.com/realtime";
pub const BITMEX_WS_TESTNET_URL: &str = "wss://ws.testnet.bitmex.com/realtime";
pub const BITMEX_HTTP_URL: &str = "https://www.bitmex.com/api/v1";
pub const BITMEX_HTTP_TESTNET_URL: &str = "https://testnet.bitmex.com/api/v1";

/// Path prefix signed into every REST request.
pub const BITMEX_API_PREFIX: &str = "/api/v1";

/// Path signed into the WebSocket authentication payload.
pub const BITMEX_WS_AUTH_PATH: &str = "GET/realtime";

/// Channels which require an authenticated connection.
///
/// Topics are matched by the portion before the first `:` so per-symbol
/// suffixes (`orderBookL2:XBTUSD`) resolve against the bare channel name.
pub const PRIVATE_CHANNELS: &[&str] = &[
    "execution",
    "order",
    "margin",
    "position",
    "privateNotifications",
    "transact",
    "wallet",
];

/// Returns `true` if the topic addresses a private channel.
#[must_use]
pub fn is_private_topic(topic: &str) -> bool {
    let channel = topic.split(':').next().unwrap_or(topic);
    PRIVATE_CHANNELS.contains(&channel)
}

/// Environment variable consulted when no API key is configured.
pub const ENV_API_KEY: &str = "BITMEX_API_KEY";
/// Environment variable consulted when no API secret is configured.
pub const ENV_API_SECRET: &str = "BITMEX_API_SECRET";
/// Environment variable overriding the signature expiry skew (seconds).
pub const ENV_AUTH_EXPIRES_SKEW_SEC: &str = "AUTH_EXPIRES_SKEW_SEC";

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
