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

//! Metrics collaborator consumed by the hub.
//!
//! The hub emits counters and histograms through this trait; wiring them into
//! an actual metrics backend is the embedding application's concern.

pub const AUTH_SUCCESS_TOTAL: &str = "auth_success_total";
pub const AUTH_ERROR_TOTAL: &str = "auth_error_total";
pub const AUTH_LATENCY_MS: &str = "auth_latency_ms";
pub const WALLET_UPDATE_COUNT: &str = "wallet_update_count";
pub const POSITION_UPDATE_COUNT: &str = "position_update_count";
pub const ORDER_UPDATE_COUNT: &str = "order_update_count";
pub const WALLET_SNAPSHOT_AGE_SEC: &str = "wallet_snapshot_age_sec";
pub const PRIVATE_LATENCY_MS: &str = "private_latency_ms";
pub const CREATE_ORDER_LATENCY_MS: &str = "create_order_latency_ms";
pub const CREATE_ORDER_ERRORS_TOTAL: &str = "create_order_errors_total";

/// Sink for hub-emitted metrics.
pub trait MetricsSink: Send + Sync {
    /// Increments a counter by `value` with the given labels.
    fn increment_counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);

    /// Records a histogram observation with the given labels.
    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// Discards all observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}

    fn observe_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}
