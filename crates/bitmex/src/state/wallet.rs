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

//! The wallet entity: per-currency balances and margin records for an account.

use ahash::AHashMap;
use chrono::{DateTime, Utc};

use crate::websocket::messages::{BitmexMarginMsg, BitmexWalletMsg};

/// Balance of a single currency.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WalletBalance {
    pub amount: f64,
    pub pending_credit: f64,
    pub pending_debit: f64,
    pub confirmed_debit: f64,
    pub transfer_in: f64,
    pub transfer_out: f64,
    pub deposited: f64,
    pub withdrawn: f64,
    /// Timestamp of the newest accepted row for this currency.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Margin state of a single currency, fed by the margin table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarginRecord {
    pub amount: f64,
    pub init_margin: f64,
    pub maint_margin: f64,
    pub margin_balance: f64,
    pub available_margin: f64,
    pub withdrawable_margin: f64,
    pub unrealised_pnl: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A wallet as maintained locally, keyed by account.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wallet {
    pub account: i64,
    /// Balances keyed by lowercased currency.
    pub balances: AHashMap<String, WalletBalance>,
    /// Margin records keyed by lowercased currency.
    pub margins: AHashMap<String, MarginRecord>,
    pub last_update_ts: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Creates a new empty [`Wallet`] instance.
    #[must_use]
    pub fn new(account: i64) -> Self {
        Self {
            account,
            ..Default::default()
        }
    }

    /// Applies a balance row.
    ///
    /// A row is dropped when its timestamp is not strictly newer than the
    /// stored per-currency timestamp, unless `reset` is set (snapshot
    /// application replaces regardless).
    ///
    /// Returns `true` if the row was accepted and changed the balance.
    pub fn apply_balance(&mut self, row: &BitmexWalletMsg, reset: bool) -> bool {
        let currency = row.currency.as_str().to_ascii_lowercase();

        if !reset
            && let Some(stored) = self.balances.get(&currency)
            && let (Some(have), Some(incoming)) = (stored.timestamp, row.timestamp)
            && incoming <= have
        {
            tracing::debug!(
                account = self.account,
                currency,
                "Stale wallet row dropped",
            );
            return false;
        }

        let balance = self.balances.entry(currency).or_default();
        let before = balance.clone();

        if reset {
            *balance = WalletBalance::default();
        }
        if let Some(v) = row.amount {
            balance.amount = v;
        }
        if let Some(v) = row.pending_credit {
            balance.pending_credit = v;
        }
        if let Some(v) = row.pending_debit {
            balance.pending_debit = v;
        }
        if let Some(v) = row.confirmed_debit {
            balance.confirmed_debit = v;
        }
        if let Some(v) = row.transfer_in {
            balance.transfer_in = v;
        }
        if let Some(v) = row.transfer_out {
            balance.transfer_out = v;
        }
        if let Some(v) = row.deposited {
            balance.deposited = v;
        }
        if let Some(v) = row.withdrawn {
            balance.withdrawn = v;
        }
        if let Some(ts) = row.timestamp {
            balance.timestamp = Some(ts);
            if self.last_update_ts.is_none_or(|prev| ts > prev) {
                self.last_update_ts = Some(ts);
            }
        }

        *balance != before
    }

    /// Applies a margin row with the same per-currency timestamp gate.
    ///
    /// Returns `true` if the row was accepted and changed the record.
    pub fn apply_margin(&mut self, row: &BitmexMarginMsg, reset: bool) -> bool {
        let currency = row.currency.as_str().to_ascii_lowercase();

        if !reset
            && let Some(stored) = self.margins.get(&currency)
            && let (Some(have), Some(incoming)) = (stored.timestamp, row.timestamp)
            && incoming <= have
        {
            tracing::debug!(
                account = self.account,
                currency,
                "Stale margin row dropped",
            );
            return false;
        }

        let margin = self.margins.entry(currency).or_default();
        let before = margin.clone();

        if reset {
            *margin = MarginRecord::default();
        }
        if let Some(v) = row.amount {
            margin.amount = v;
        }
        if let Some(v) = row.init_margin {
            margin.init_margin = v;
        }
        if let Some(v) = row.maint_margin {
            margin.maint_margin = v;
        }
        if let Some(v) = row.margin_balance {
            margin.margin_balance = v;
        }
        if let Some(v) = row.available_margin {
            margin.available_margin = v;
        }
        if let Some(v) = row.withdrawable_margin {
            margin.withdrawable_margin = v;
        }
        if let Some(v) = row.unrealised_pnl {
            margin.unrealised_pnl = v;
        }
        if let Some(ts) = row.timestamp {
            margin.timestamp = Some(ts);
        }

        *margin != before
    }

    /// Looks up a balance by currency (any casing).
    #[must_use]
    pub fn balance(&self, currency: &str) -> Option<&WalletBalance> {
        self.balances.get(&currency.to_ascii_lowercase())
    }

    /// Field names differing between two snapshots, for diff events.
    ///
    /// Balances are compared as whole maps; a changed currency reports the
    /// `balances` field.
    #[must_use]
    pub fn changed_fields(prev: &Self, next: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if prev.balances != next.balances {
            changed.push("balances");
        }
        if prev.margins != next.margins {
            changed.push("margins");
        }
        if prev.last_update_ts != next.last_update_ts {
            changed.push("last_update_ts");
        }
        changed
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn row(currency: &str, amount: f64, ts: &str) -> BitmexWalletMsg {
        serde_json::from_value(serde_json::json!({
            "account": 100001,
            "currency": currency,
            "amount": amount,
            "timestamp": ts,
        }))
        .unwrap()
    }

    #[rstest]
    fn test_stale_rows_dropped_newest_wins() {
        let mut wallet = Wallet::new(100_001);

        assert!(wallet.apply_balance(&row("XBt", 500_000.0, "2024-01-05T00:01:20Z"), true));
        assert!(wallet.apply_balance(&row("XBt", 510_000.0, "2024-01-05T00:01:40Z"), false));
        // Older than the stored timestamp: dropped
        assert!(!wallet.apply_balance(&row("XBt", 480_000.0, "2024-01-05T00:01:35Z"), false));

        assert_eq!(wallet.balance("xbt").unwrap().amount, 510_000.0);
        assert_eq!(wallet.balance("XBt").unwrap().amount, 510_000.0);
    }

    #[rstest]
    fn test_equal_timestamp_dropped() {
        let mut wallet = Wallet::new(100_001);
        wallet.apply_balance(&row("XBt", 500_000.0, "2024-01-05T00:01:20Z"), true);

        assert!(!wallet.apply_balance(&row("XBt", 999.0, "2024-01-05T00:01:20Z"), false));
        assert_eq!(wallet.balance("xbt").unwrap().amount, 500_000.0);
    }

    #[rstest]
    fn test_reset_accepts_older_timestamp() {
        let mut wallet = Wallet::new(100_001);
        wallet.apply_balance(&row("XBt", 500_000.0, "2024-01-05T00:01:40Z"), true);

        assert!(wallet.apply_balance(&row("XBt", 480_000.0, "2024-01-05T00:01:20Z"), true));
        assert_eq!(wallet.balance("xbt").unwrap().amount, 480_000.0);
    }

    #[rstest]
    fn test_currencies_gate_independently() {
        let mut wallet = Wallet::new(100_001);
        wallet.apply_balance(&row("XBt", 500_000.0, "2024-01-05T00:01:40Z"), true);

        // A different currency with an older timestamp is still fresh
        assert!(wallet.apply_balance(&row("USDt", 1_000.0, "2024-01-05T00:01:20Z"), false));
        assert_eq!(wallet.balance("usdt").unwrap().amount, 1_000.0);
    }

    #[rstest]
    fn test_margin_row_applies() {
        let mut wallet = Wallet::new(100_001);
        let margin: BitmexMarginMsg = serde_json::from_value(serde_json::json!({
            "account": 100001,
            "currency": "XBt",
            "amount": 250000,
            "availableMargin": 240000,
            "initMargin": 10000,
            "timestamp": "2024-01-05T00:01:20Z",
        }))
        .unwrap();

        assert!(wallet.apply_margin(&margin, false));
        let record = wallet.margins.get("xbt").unwrap();
        assert_eq!(record.amount, 250_000.0);
        assert_eq!(record.available_margin, 240_000.0);
    }
}
