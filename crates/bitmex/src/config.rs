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

//! Configuration for the BitMEX hub client.

use crate::common::consts::{ENV_API_KEY, ENV_API_SECRET, ENV_AUTH_EXPIRES_SKEW_SEC};
use crate::common::urls::{get_http_base_url, get_ws_url};

/// Configuration for the BitMEX hub client.
#[derive(Clone, Debug)]
pub struct BitmexClientConfig {
    /// Optional API key used for authenticated REST/WebSocket requests.
    pub api_key: Option<String>,
    /// Optional API secret used for authenticated REST/WebSocket requests.
    pub api_secret: Option<String>,
    /// When `true`, use BitMEX testnet endpoints by default.
    pub use_testnet: bool,
    /// Optional override for the REST base URL.
    pub base_url_http: Option<String>,
    /// Optional override for the WebSocket URL.
    pub base_url_ws: Option<String>,
    /// When `true`, native symbols are mapped onto unified aliases.
    pub symbol_mapping_enabled: bool,
    /// Seconds added to `now` when computing signature expiries (default 60).
    pub auth_expires_skew_secs: i64,
    /// Interval between keepalive pings while the socket is open.
    pub ping_interval_ms: u64,
    /// Deadline for a pong after each ping; elapsing terminates the socket.
    pub pong_timeout_ms: u64,
    /// Initial reconnect delay; doubles per attempt.
    pub reconnect_delay_initial_ms: u64,
    /// Upper bound on the reconnect delay.
    pub reconnect_delay_max_ms: u64,
    /// Reconnect attempts before surfacing a terminal transport error.
    pub reconnect_max_attempts: u32,
    /// Maximum frames held in the outbound send buffer.
    pub send_buffer_limit: usize,
    /// Window for an authentication attempt to complete.
    pub auth_timeout_ms: u64,
    /// Per-request timeout for REST calls.
    pub http_timeout_secs: u64,
    /// Overall timeout for order placement before reconciliation starts.
    pub order_timeout_ms: u64,
}

impl Default for BitmexClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            use_testnet: false,
            base_url_http: None,
            base_url_ws: None,
            symbol_mapping_enabled: true,
            auth_expires_skew_secs: 60,
            ping_interval_ms: 25_000,
            pong_timeout_ms: 15_000,
            reconnect_delay_initial_ms: 1_000,
            reconnect_delay_max_ms: 10_000,
            reconnect_max_attempts: 10,
            send_buffer_limit: 1_000,
            auth_timeout_ms: 5_000,
            http_timeout_secs: 60,
            order_timeout_ms: 10_000,
        }
    }
}

impl BitmexClientConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration sourcing credentials and the expiry skew from
    /// the environment (`BITMEX_API_KEY`, `BITMEX_API_SECRET`,
    /// `AUTH_EXPIRES_SKEW_SEC`) where not already set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_fallback()
    }

    /// Fills unset credentials and the expiry skew from the environment.
    #[must_use]
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(ENV_API_KEY).ok().filter(|v| !v.is_empty());
        }
        if self.api_secret.is_none() {
            self.api_secret = std::env::var(ENV_API_SECRET).ok().filter(|v| !v.is_empty());
        }
        if let Ok(skew) = std::env::var(ENV_AUTH_EXPIRES_SKEW_SEC)
            && let Ok(secs) = skew.trim().parse::<i64>()
        {
            self.auth_expires_skew_secs = secs;
        }
        self
    }

    /// Returns `true` if both API key and secret are available.
    #[must_use]
    pub fn has_api_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    /// Returns the REST base URL, considering overrides and the testnet flag.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        self.base_url_http
            .clone()
            .unwrap_or_else(|| get_http_base_url(self.use_testnet))
    }

    /// Returns the WebSocket URL, considering overrides and the testnet flag.
    #[must_use]
    pub fn ws_url(&self) -> String {
        self.base_url_ws
            .clone()
            .unwrap_or_else(|| get_ws_url(self.use_testnet))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_defaults() {
        let config = BitmexClientConfig::default();
        assert_eq!(config.auth_expires_skew_secs, 60);
        assert_eq!(config.ping_interval_ms, 25_000);
        assert_eq!(config.pong_timeout_ms, 15_000);
        assert_eq!(config.send_buffer_limit, 1_000);
        assert!(!config.has_api_credentials());
    }

    #[rstest]
    fn test_url_selection() {
        let mainnet = BitmexClientConfig::default();
        assert_eq!(mainnet.http_base_url(), "https://www.bitmex.com/api/v1");
        assert_eq!(mainnet.ws_url(), "wss://ws.bitmex.com/realtime");

        let testnet = BitmexClientConfig {
            use_testnet: true,
            ..Default::default()
        };
        assert_eq!(testnet.http_base_url(), "https://testnet.bitmex.com/api/v1");
        assert_eq!(testnet.ws_url(), "wss://ws.testnet.bitmex.com/realtime");

        let overridden = BitmexClientConfig {
            base_url_http: Some("http://127.0.0.1:8080".to_string()),
            base_url_ws: Some("ws://127.0.0.1:8080/realtime".to_string()),
            use_testnet: true,
            ..Default::default()
        };
        assert_eq!(overridden.http_base_url(), "http://127.0.0.1:8080");
        assert_eq!(overridden.ws_url(), "ws://127.0.0.1:8080/realtime");
    }

    #[rstest]
    fn test_explicit_credentials_take_precedence() {
        let config = BitmexClientConfig {
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..Default::default()
        }
        .with_env_fallback();

        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.api_secret.as_deref(), Some("secret"));
    }
}
